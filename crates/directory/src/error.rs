//! Error types for loading and watching the user directory.

use std::path::PathBuf;

/// Why a single record file could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Not well-formed JSON, not an object of records, or a field is missing
    /// or has the wrong type.
    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The same file-local key labels two records.
    #[error("key '{key}' appears more than once")]
    DuplicateKey { key: String },

    /// Decoded, but a record failed its own validation.
    #[error("record '{key}' is invalid: {reason}")]
    Invalid { key: String, reason: String },
}

/// Why a load pass produced no snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Root path missing or unreadable.
    #[error("user directory {} is unavailable: {source}", .path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An eligible file exists but could not be read.
    #[error("could not read {}: {source}", .file.display())]
    FileUnreadable {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid users in {}: {source}", .file.display())]
    MalformedRecordFile {
        file: PathBuf,
        #[source]
        source: RecordError,
    },

    /// The same id is defined more than once. `files` lists every file
    /// defining it, in load order (a file appears twice if it repeats the id).
    #[error("user with ID {id} defined more than once: {}", display_paths(.files))]
    DuplicateId { id: String, files: Vec<PathBuf> },

    /// Only raised under the `reject` duplicate-username policy.
    #[error("username {username} is shared by IDs {}", .ids.join(", "))]
    DuplicateUsername { username: String, ids: Vec<String> },
}

impl LoadError {
    /// Short machine-readable name of the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::DirectoryUnavailable { .. } => "directory_unavailable",
            LoadError::FileUnreadable { .. } => "file_unreadable",
            LoadError::MalformedRecordFile { .. } => "malformed_record_file",
            LoadError::DuplicateId { .. } => "duplicate_id",
            LoadError::DuplicateUsername { .. } => "duplicate_username",
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the filesystem watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification backend itself could not be created.
    #[error("Notify watcher error: {0}")]
    Backend(#[from] notify::Error),

    /// One path could not be registered. Logged; never stops the watcher.
    #[error("could not watch {}: {source}", .path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Result alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
