//! Hot reload of the user directory via the `notify` watcher.
//!
//! Watches the root directory plus every file of the last good load. Bursts
//! of create/modify/remove events are coalesced into one reload; a good
//! reload replaces the directory's snapshot, a bad one lands in the
//! [`ErrorSink`](crate::error_sink::ErrorSink) and the previous snapshot keeps
//! serving.

mod core;
mod events;
mod watch_set;


pub use self::core::{Watcher, WatcherHandle, WatcherState};
