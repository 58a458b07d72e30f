//! Immutable, fully-built views of the user set.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use userdir_core::DuplicateUsernamePolicy;

use crate::error::{LoadError, Result};
use crate::record::{Identity, User};

/// One complete load of the user directory.
///
/// Built once, never mutated. Records are reference counted so a caller
/// holding one keeps it alive after the snapshot is superseded.
#[derive(Debug)]
pub struct Snapshot<R = User> {
    by_id: HashMap<String, Arc<R>>,
    /// username -> id of the record that answers lookups for it.
    by_username: HashMap<String, String>,
    files: Vec<PathBuf>,
    loaded_at: DateTime<Utc>,
}

impl<R: Identity> Snapshot<R> {
    /// A snapshot with no users.
    pub fn empty() -> Self {
        Self {
            by_id: HashMap::new(),
            by_username: HashMap::new(),
            files: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Build from records already keyed by id, indexing usernames under
    /// `policy`.
    ///
    /// Under [`DuplicateUsernamePolicy::First`] the lowest id (by string
    /// order) owns a shared username.
    pub(crate) fn build(
        by_id: HashMap<String, Arc<R>>,
        files: Vec<PathBuf>,
        policy: DuplicateUsernamePolicy,
    ) -> Result<Self> {
        let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, record) in &by_id {
            owners.entry(record.username()).or_default().push(id.as_str());
        }

        let mut by_username = HashMap::with_capacity(owners.len());
        let mut collisions = Vec::new();
        for (username, mut ids) in owners {
            ids.sort_unstable();
            if ids.len() > 1 {
                collisions.push((username, ids.clone()));
            }
            by_username.insert(username.to_string(), ids[0].to_string());
        }

        if !collisions.is_empty() {
            collisions.sort_unstable();
            match policy {
                DuplicateUsernamePolicy::Reject => {
                    let (username, ids) = &collisions[0];
                    return Err(LoadError::DuplicateUsername {
                        username: username.to_string(),
                        ids: ids.iter().map(|s| s.to_string()).collect(),
                    });
                }
                DuplicateUsernamePolicy::First => {
                    for (username, ids) in &collisions {
                        warn!(username = %username, ids = ?ids, winner = %ids[0], "duplicate username, lowest id wins");
                    }
                }
            }
        }

        Ok(Self {
            by_id,
            by_username,
            files,
            loaded_at: Utc::now(),
        })
    }

    /// Build from a flat record list, as the loader would from one file.
    pub fn from_records<I>(records: I, policy: DuplicateUsernamePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
    {
        let mut by_id = HashMap::new();
        for record in records {
            let id = record.id().to_string();
            if by_id.contains_key(&id) {
                return Err(LoadError::DuplicateId { id, files: Vec::new() });
            }
            by_id.insert(id, Arc::new(record));
        }
        Self::build(by_id, Vec::new(), policy)
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<R>> {
        self.by_id.get(id).cloned()
    }

    pub fn get_by_username(&self, username: &str) -> Option<Arc<R>> {
        self.by_username
            .get(username)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<R>> {
        self.by_id.values()
    }

    /// Files that contributed to this snapshot, sorted.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Same ids mapping to equal records.
    pub fn same_records(&self, other: &Self) -> bool
    where
        R: PartialEq,
    {
        self.by_id.len() == other.by_id.len()
            && self
                .by_id
                .iter()
                .all(|(id, rec)| other.by_id.get(id).is_some_and(|o| **o == **rec))
    }
}
