//! Core [`Watcher`] worker and its [`WatcherHandle`].

use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use userdir_core::clamp_debounce;

use crate::directory::Directory;
use crate::error::WatchError;
use crate::error_sink::ErrorSink;
use crate::loader::Loader;
use crate::record::{Identity, User};

use super::events::{is_relevant, vanished_paths};
use super::watch_set::WatchSet;

/// Upper bound on how long a continuous stream of events can postpone a
/// reload, as a multiple of the debounce window.
const MAX_SETTLE_WINDOWS: u32 = 8;

/// While the root is not registered with the backend, check for it again
/// every this many debounce windows.
const ROOT_RETRY_WINDOWS: u32 = 4;
const MIN_ROOT_RETRY: Duration = Duration::from_millis(100);

/// Lifecycle of the watcher worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Starting,
    Watching,
    Reloading,
    Stopped,
}

/// Background worker that reloads the directory when record files change.
pub struct Watcher<R = User> {
    loader: Loader<R>,
    directory: Arc<Directory<R>>,
    errors: Arc<ErrorSink>,
    debounce: Duration,
}

impl<R: Identity> Watcher<R> {
    pub fn new(
        loader: Loader<R>,
        directory: Arc<Directory<R>>,
        errors: Arc<ErrorSink>,
        debounce: Duration,
    ) -> Self {
        Self {
            loader,
            directory,
            errors,
            debounce: clamp_debounce(debounce),
        }
    }

    /// Create the notification backend and spawn the worker on the current
    /// tokio runtime.
    ///
    /// Only a failure to create the backend is returned; paths that cannot be
    /// registered are logged and skipped.
    pub fn start(self) -> Result<WatcherHandle, WatchError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        // The callback runs on notify's own thread; an unbounded send needs no
        // runtime context.
        let backend = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

        let (state_tx, state_rx) = watch::channel(WatcherState::Starting);
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(self.run(backend, event_rx, state_tx, Arc::clone(&shutdown)));

        Ok(WatcherHandle {
            shutdown,
            state: state_rx,
            task: Some(task),
        })
    }

    async fn run(
        self,
        mut backend: RecommendedWatcher,
        mut events: UnboundedReceiver<notify::Result<Event>>,
        state: watch::Sender<WatcherState>,
        shutdown: Arc<Notify>,
    ) {
        let mut watch_set = WatchSet::new(self.loader.root(), self.loader.is_recursive());
        watch_set.sync(&mut backend, self.directory.snapshot().files());
        info!(
            path = %self.loader.root().display(),
            recursive = self.loader.is_recursive(),
            files = watch_set.file_count(),
            "watching user directory for changes"
        );
        state.send_replace(WatcherState::Watching);

        // Once the root is gone nothing is left to report its return.
        let mut root_retry =
            tokio::time::interval((self.debounce * ROOT_RETRY_WINDOWS).max(MIN_ROOT_RETRY));
        root_retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                received = events.recv() => match received {
                    Some(res) => {
                        if !self.triage(res, &mut watch_set) {
                            continue;
                        }
                    }
                    None => {
                        warn!("notification channel closed");
                        break;
                    }
                },
                _ = root_retry.tick(), if !watch_set.is_root_watched() => {
                    if !self.rearm_root(&mut backend, &mut watch_set).await {
                        continue;
                    }
                }
            }

            if !self.settle(&mut events, &mut watch_set, &shutdown).await {
                break;
            }

            state.send_replace(WatcherState::Reloading);
            self.reload(&mut backend, &mut watch_set).await;
            state.send_replace(WatcherState::Watching);
        }

        // Dropping the backend stops notification delivery.
        drop(backend);
        state.send_replace(WatcherState::Stopped);
        info!("user directory watcher stopped");
    }

    /// Register the root again if it exists; true if it is now watched and
    /// a reload should pick up whatever it holds.
    async fn rearm_root(&self, backend: &mut RecommendedWatcher, watch_set: &mut WatchSet) -> bool {
        if !self.root_is_dir().await {
            return false;
        }
        watch_set.ensure_root(backend);
        if watch_set.is_root_watched() {
            info!(path = %self.loader.root().display(), "user directory is back, reloading");
        }
        watch_set.is_root_watched()
    }

    async fn root_is_dir(&self) -> bool {
        tokio::fs::metadata(self.loader.root())
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    /// Log and bookkeep one backend message; true if it warrants a reload.
    pub(super) fn triage(&self, res: notify::Result<Event>, watch_set: &mut WatchSet) -> bool {
        match res {
            Ok(event) => {
                for path in vanished_paths(&event) {
                    watch_set.forget(path);
                }
                let relevant = is_relevant(&event, &self.loader);
                if relevant {
                    debug!(kind = ?event.kind, paths = ?event.paths, "user file changed");
                }
                relevant
            }
            Err(e) => {
                warn!(error = %e, paths = ?e.paths, "filesystem watcher error");
                false
            }
        }
    }

    /// Absorb the rest of a burst. Returns once no relevant event has arrived
    /// for one debounce window (or the burst has run for
    /// `MAX_SETTLE_WINDOWS` windows); false if shutdown was requested.
    async fn settle(
        &self,
        events: &mut UnboundedReceiver<notify::Result<Event>>,
        watch_set: &mut WatchSet,
        shutdown: &Notify,
    ) -> bool {
        let deadline = Instant::now() + self.debounce * MAX_SETTLE_WINDOWS;
        let mut quiet_at = Instant::now() + self.debounce;
        let mut absorbed = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => return false,
                _ = tokio::time::sleep_until(quiet_at.min(deadline)) => {
                    if absorbed > 0 {
                        debug!(absorbed, "coalesced file events into one reload");
                    }
                    return true;
                }
                received = events.recv() => match received {
                    Some(res) => {
                        if self.triage(res, watch_set) {
                            absorbed += 1;
                            quiet_at = Instant::now() + self.debounce;
                        }
                    }
                    None => return true,
                },
            }
        }
    }

    /// One reload attempt. Publishes on success, records the failure otherwise.
    async fn reload(&self, backend: &mut RecommendedWatcher, watch_set: &mut WatchSet) {
        let attempt = self.errors.begin_attempt();
        let loader = self.loader.clone();

        match tokio::task::spawn_blocking(move || loader.load_all()).await {
            Ok(Ok(snapshot)) => {
                watch_set.sync(backend, snapshot.files());
                let users = snapshot.len();
                let generation = self.directory.replace_snapshot(snapshot);
                self.errors.record_success(attempt);
                info!(attempt, generation, users, "reloaded users");
            }
            Ok(Err(e)) => {
                warn!(attempt, error = %e, "error reloading users, keeping previous snapshot");
                if self.root_is_dir().await {
                    // The root may have been recreated since it was last seen.
                    watch_set.ensure_root(backend);
                } else {
                    // Its registration died with it; the retry timer takes over.
                    watch_set.forget(self.loader.root());
                }
                self.errors.record_failure(attempt, e);
            }
            Err(e) => {
                error!(attempt, error = %e, "reload task did not complete");
            }
        }
    }
}

/// Owner-side handle of a running [`Watcher`].
///
/// Dropping the handle asks the worker to stop without waiting for it; use
/// [`WatcherHandle::shutdown`] to wait.
pub struct WatcherHandle {
    shutdown: Arc<Notify>,
    state: watch::Receiver<WatcherState>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.clone()
    }

    /// Wait until the worker reports `target`. False if the worker exited
    /// first.
    pub async fn wait_for_state(&self, target: WatcherState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|s| *s == target).await.is_ok();
        reached
    }

    /// Signal the worker and wait for it to exit. A reload already running
    /// finishes (and publishes) before the worker stops.
    pub async fn shutdown(mut self) {
        // notify_one stores a permit, so the signal is not lost if the worker
        // is mid-reload rather than waiting.
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "watcher task ended abnormally");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shutdown.notify_one();
        }
    }
}
