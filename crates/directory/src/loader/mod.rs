//! Filesystem user loader.
//!
//! Scans the user directory for record files and builds a complete
//! [`Snapshot`](crate::snapshot::Snapshot) in one pass, or fails as a whole.

mod core;


pub use self::core::Loader;
