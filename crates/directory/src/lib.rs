//! File-backed user directory with hot reload.
//!
//! This crate provides:
//! - JSON record files decoded into [`User`] (or any [`Identity`] type)
//! - A loader that turns a directory of record files into an immutable [`Snapshot`]
//! - A [`Directory`] serving lookups by id and username, swapped atomically on reload
//! - A `notify`-driven [`Watcher`] that coalesces file events into reloads
//! - An [`ErrorSink`] holding the last reload failure for health checks

pub mod directory;
pub mod error;
pub mod error_sink;
pub mod loader;
pub mod parser;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod watcher;

pub use directory::{Directory, EXAMPLE_CLIENT_ID};
pub use error::{LoadError, RecordError, Result, WatchError};
pub use error_sink::{ErrorSink, ReloadFailure};
pub use loader::Loader;
pub use parser::parse_records;
pub use record::{Identity, LanguageTag, User};
pub use snapshot::Snapshot;
pub use store::{HealthReport, HealthStatus, UserDirectory, UserStore};
pub use watcher::{Watcher, WatcherHandle, WatcherState};
