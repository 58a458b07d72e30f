//! Core [`Loader`] struct: one full pass over the user directory.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use userdir_core::{DirectoryConfig, DuplicateUsernamePolicy};

use crate::error::{LoadError, Result};
use crate::parser::parse_records;
use crate::record::{Identity, User};
use crate::snapshot::Snapshot;

/// Filesystem-backed snapshot builder.
///
/// Scans the root directory (recursively if configured) for files with the
/// record extension, parses every one, and merges the records into a single
/// [`Snapshot`] keyed by id. Any failure aborts the whole pass; a partial
/// snapshot is never returned.
pub struct Loader<R = User> {
    root: PathBuf,
    recursive: bool,
    extension: String,
    duplicate_usernames: DuplicateUsernamePolicy,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Loader<R> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            recursive: self.recursive,
            extension: self.extension.clone(),
            duplicate_usernames: self.duplicate_usernames,
            _record: PhantomData,
        }
    }
}

impl<R: Identity> Loader<R> {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            root: config.data_dir.clone(),
            recursive: config.recursive,
            extension: config.extension.clone(),
            duplicate_usernames: config.duplicate_usernames,
            _record: PhantomData,
        }
    }

    /// Root directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Whether `path` names a record file: right extension, not a dotfile.
    pub fn is_record_file(&self, path: &Path) -> bool {
        let visible = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| !n.starts_with('.'))
            .unwrap_or(false);
        visible
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == self.extension)
                .unwrap_or(false)
    }

    /// Load every record file under the root into a new snapshot.
    pub fn load_all(&self) -> Result<Snapshot<R>> {
        let files = self.discover()?;

        let mut by_id: HashMap<String, Arc<R>> = HashMap::new();
        let mut origin: HashMap<String, PathBuf> = HashMap::new();
        let mut loaded_files = Vec::with_capacity(files.len());

        for path in files {
            let records = match self.load_file(&path) {
                Ok(records) => records,
                Err(LoadError::FileUnreadable { source, .. })
                    if source.kind() == io::ErrorKind::NotFound =>
                {
                    debug!(path = %path.display(), "record file vanished before it could be read");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let count = records.len();
            for record in records {
                let id = record.id().to_string();
                match by_id.entry(id) {
                    Entry::Occupied(entry) => {
                        let first = origin.get(entry.key()).cloned().unwrap_or_default();
                        return Err(LoadError::DuplicateId {
                            id: entry.key().clone(),
                            files: vec![first, path.clone()],
                        });
                    }
                    Entry::Vacant(entry) => {
                        origin.insert(entry.key().clone(), path.clone());
                        entry.insert(Arc::new(record));
                    }
                }
            }

            info!(path = %path.display(), users = count, "loaded users");
            loaded_files.push(path);
        }

        Snapshot::build(by_id, loaded_files, self.duplicate_usernames)
    }

    /// Read and parse a single record file.
    pub fn load_file(&self, path: &Path) -> Result<Vec<R>> {
        let bytes = fs::read(path).map_err(|source| LoadError::FileUnreadable {
            file: path.to_path_buf(),
            source,
        })?;
        parse_records(&bytes).map_err(|source| LoadError::MalformedRecordFile {
            file: path.to_path_buf(),
            source,
        })
    }

    /// Eligible record files under the root, sorted.
    fn discover(&self) -> Result<Vec<PathBuf>> {
        let meta = fs::metadata(&self.root).map_err(|source| LoadError::DirectoryUnavailable {
            path: self.root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(LoadError::DirectoryUnavailable {
                path: self.root.clone(),
                source: io::Error::other("not a directory"),
            });
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .into_iter()
            // The root itself passes through the filter too; only prune below it.
            .filter_entry(|e| {
                e.depth() == 0
                    || e.file_name()
                        .to_str()
                        .map(|n| !n.starts_with('.'))
                        .unwrap_or(false)
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at_root = e.depth() == 0 || e.path() == Some(self.root.as_path());
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                    if at_root {
                        return Err(LoadError::DirectoryUnavailable {
                            path: self.root.clone(),
                            source,
                        });
                    }
                    if source.kind() == io::ErrorKind::NotFound {
                        debug!(path = %path.display(), "entry vanished during scan");
                        continue;
                    }
                    return Err(LoadError::FileUnreadable { file: path, source });
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            if self.is_record_file(entry.path()) {
                files.push(entry.into_path());
            } else {
                debug!(path = %entry.path().display(), "skipping non-record file");
            }
        }

        files.sort();
        Ok(files)
    }
}
