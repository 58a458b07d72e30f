//! Startup wiring and the read interface handed to the authorization layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use userdir_core::DirectoryConfig;

use crate::directory::Directory;
use crate::error::{Result, WatchError};
use crate::error_sink::{ErrorSink, ReloadFailure};
use crate::loader::Loader;
use crate::record::{Identity, User};
use crate::watcher::{Watcher, WatcherHandle};

/// What an authorization server needs from the user directory.
pub trait UserDirectory: Send + Sync {
    type Record;

    fn user_by_id(&self, id: &str) -> Option<Arc<Self::Record>>;

    fn user_by_username(&self, username: &str) -> Option<Arc<Self::Record>>;

    /// Client id of the built-in service-to-service client.
    fn example_client_id(&self) -> &str;

    fn health(&self) -> HealthReport;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The last reload attempt (if any) succeeded.
    Ok,
    /// The last reload failed; stale data is being served.
    Degraded,
}

/// Point-in-time health of the directory.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub generation: u64,
    pub users: usize,
    pub loaded_at: DateTime<Utc>,
    pub reload_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ReloadFailure>,
}

/// The user directory as a running component: loader, published snapshot
/// and reload error state.
pub struct UserStore<R = User> {
    config: DirectoryConfig,
    loader: Loader<R>,
    directory: Arc<Directory<R>>,
    errors: Arc<ErrorSink>,
}

impl<R: Identity> UserStore<R> {
    /// Load the directory for the first time.
    ///
    /// Blocks on filesystem I/O. A failure here means there is nothing to
    /// serve, so it is returned rather than recorded.
    pub fn open(config: DirectoryConfig) -> Result<Self> {
        let loader = Loader::new(&config);
        let snapshot = loader.load_all()?;
        info!(
            path = %config.data_dir.display(),
            users = snapshot.len(),
            files = snapshot.files().len(),
            "loaded user directory"
        );
        Ok(Self {
            config,
            loader,
            directory: Arc::new(Directory::new(snapshot)),
            errors: Arc::new(ErrorSink::new()),
        })
    }

    /// Start hot reload on the current tokio runtime.
    pub fn watch(&self) -> std::result::Result<WatcherHandle, WatchError> {
        Watcher::new(
            self.loader.clone(),
            Arc::clone(&self.directory),
            Arc::clone(&self.errors),
            self.config.reload_debounce,
        )
        .start()
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<Directory<R>> {
        &self.directory
    }

    pub fn errors(&self) -> &Arc<ErrorSink> {
        &self.errors
    }
}

impl<R: Identity> UserDirectory for UserStore<R> {
    type Record = R;

    fn user_by_id(&self, id: &str) -> Option<Arc<R>> {
        self.directory.get_by_id(id)
    }

    fn user_by_username(&self, username: &str) -> Option<Arc<R>> {
        self.directory.get_by_username(username)
    }

    fn example_client_id(&self) -> &str {
        self.directory.example_client_id()
    }

    fn health(&self) -> HealthReport {
        let snapshot = self.directory.snapshot();
        let last_error = self.errors.last_error();
        HealthReport {
            status: if last_error.is_some() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Ok
            },
            generation: self.directory.generation(),
            users: snapshot.len(),
            loaded_at: snapshot.loaded_at(),
            reload_attempts: self.errors.attempts(),
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::error::LoadError;

    fn seeded() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("users.json"),
            r#"{"u1": {"id": "1", "username": "alice", "password": "pw"}}"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn open_serves_initial_load() {
        let dir = seeded();
        let store: UserStore = UserStore::open(DirectoryConfig::new(dir.path())).unwrap();
        assert_eq!(store.user_by_username("alice").unwrap().id, "1");
        assert!(store.user_by_id("2").is_none());
        assert_eq!(store.example_client_id(), "service");

        let health = store.health();
        assert_eq!(health.status, HealthStatus::Ok);
        assert_eq!(health.generation, 1);
        assert_eq!(health.users, 1);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn open_fails_on_bad_initial_load() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("users.json"), "[]").unwrap();
        let err = UserStore::<User>::open(DirectoryConfig::new(dir.path())).err().unwrap();
        assert!(matches!(err, LoadError::MalformedRecordFile { .. }));

        let missing = UserStore::<User>::open(DirectoryConfig::new(dir.path().join("gone")));
        assert!(matches!(missing, Err(LoadError::DirectoryUnavailable { .. })));
    }

    #[test]
    fn health_reports_degraded_after_failed_reload() {
        let dir = seeded();
        let store: UserStore = UserStore::open(DirectoryConfig::new(dir.path())).unwrap();
        let attempt = store.errors().begin_attempt();
        store.errors().record_failure(
            attempt,
            LoadError::DuplicateId {
                id: "1".into(),
                files: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
            },
        );

        let health = store.health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.reload_attempts, 1);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["last_error"]["kind"], "duplicate_id");
        // Stale data keeps being served.
        assert!(store.user_by_id("1").is_some());
    }

    /// A caller-defined record shape flows through unchanged.
    #[derive(Debug, serde::Deserialize)]
    struct Operator {
        handle: String,
        login: String,
    }

    impl Identity for Operator {
        fn id(&self) -> &str {
            &self.handle
        }

        fn username(&self) -> &str {
            &self.login
        }
    }

    #[test]
    fn custom_record_type() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("ops.json"),
            r#"{"x": {"handle": "op-1", "login": "root"}}"#,
        )
        .unwrap();
        let store = UserStore::<Operator>::open(DirectoryConfig::new(dir.path())).unwrap();
        assert_eq!(store.user_by_username("root").unwrap().handle, "op-1");
    }
}
