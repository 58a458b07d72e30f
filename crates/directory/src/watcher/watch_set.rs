//! Bookkeeping for which paths are registered with the notify backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::RecursiveMode;
use tracing::{debug, warn};

use crate::error::WatchError;

/// Root directory plus the individual record files of the last good load.
pub(super) struct WatchSet {
    root: PathBuf,
    mode: RecursiveMode,
    root_watched: bool,
    files: BTreeSet<PathBuf>,
}

impl WatchSet {
    pub(super) fn new(root: &Path, recursive: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            mode: if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            },
            root_watched: false,
            files: BTreeSet::new(),
        }
    }

    /// (Re)register the root if it is not currently watched.
    pub(super) fn ensure_root<W: notify::Watcher>(&mut self, backend: &mut W) {
        if self.root_watched {
            return;
        }
        match backend.watch(&self.root, self.mode) {
            Ok(()) => self.root_watched = true,
            Err(source) => report(WatchError::Setup {
                path: self.root.clone(),
                source,
            }),
        }
    }

    /// Make the per-file registrations match `files`.
    pub(super) fn sync<W: notify::Watcher>(&mut self, backend: &mut W, files: &[PathBuf]) {
        self.ensure_root(backend);

        let wanted: BTreeSet<PathBuf> = files.iter().cloned().collect();

        let stale: Vec<PathBuf> = self.files.difference(&wanted).cloned().collect();
        for path in stale {
            if let Err(e) = backend.unwatch(&path) {
                // Usually the backend already dropped it when the file went away.
                debug!(path = %path.display(), error = %e, "unwatch failed");
            }
            self.files.remove(&path);
        }

        for path in wanted {
            if self.files.contains(&path) {
                continue;
            }
            match backend.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.files.insert(path);
                }
                Err(source) => report(WatchError::Setup { path, source }),
            }
        }
    }

    /// Drop a path the backend reported as removed or renamed away, so it is
    /// registered again if it comes back.
    pub(super) fn forget(&mut self, path: &Path) {
        if path == self.root {
            self.root_watched = false;
        }
        self.files.remove(path);
    }

    pub(super) fn is_root_watched(&self) -> bool {
        self.root_watched
    }

    pub(super) fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn report(error: WatchError) {
    warn!(error = %error, "watch setup failure, continuing without it");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use notify::Config;

    use super::*;

    /// In-memory backend recording registrations.
    #[derive(Default)]
    struct FakeBackend {
        watched: HashSet<PathBuf>,
        refuse: HashSet<PathBuf>,
    }

    impl notify::Watcher for FakeBackend {
        fn new<F: notify::EventHandler>(_handler: F, _config: Config) -> notify::Result<Self> {
            Ok(Self::default())
        }

        fn watch(&mut self, path: &Path, _mode: RecursiveMode) -> notify::Result<()> {
            if self.refuse.contains(path) {
                return Err(notify::Error::path_not_found().add_path(path.to_path_buf()));
            }
            self.watched.insert(path.to_path_buf());
            Ok(())
        }

        fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
            if self.watched.remove(path) {
                Ok(())
            } else {
                Err(notify::Error::watch_not_found())
            }
        }

        fn kind() -> notify::WatcherKind {
            notify::WatcherKind::NullWatcher
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/users").join(n)).collect()
    }

    #[test]
    fn sync_registers_root_and_files() {
        let mut backend = FakeBackend::default();
        let mut set = WatchSet::new(Path::new("/users"), false);
        set.sync(&mut backend, &paths(&["a.json", "b.json"]));

        assert!(set.is_root_watched());
        assert_eq!(set.file_count(), 2);
        assert!(backend.watched.contains(Path::new("/users")));
        assert!(backend.watched.contains(Path::new("/users/a.json")));
    }

    #[test]
    fn sync_drops_files_no_longer_loaded() {
        let mut backend = FakeBackend::default();
        let mut set = WatchSet::new(Path::new("/users"), false);
        set.sync(&mut backend, &paths(&["a.json", "b.json"]));
        set.sync(&mut backend, &paths(&["b.json", "c.json"]));

        assert_eq!(set.file_count(), 2);
        assert!(!backend.watched.contains(Path::new("/users/a.json")));
        assert!(backend.watched.contains(Path::new("/users/c.json")));
    }

    #[test]
    fn setup_failure_is_skipped_not_fatal() {
        let mut backend = FakeBackend::default();
        backend.refuse.insert(PathBuf::from("/users/bad.json"));
        let mut set = WatchSet::new(Path::new("/users"), false);
        set.sync(&mut backend, &paths(&["bad.json", "good.json"]));

        assert_eq!(set.file_count(), 1);
        assert!(backend.watched.contains(Path::new("/users/good.json")));

        // Retried on the next sync.
        backend.refuse.clear();
        set.sync(&mut backend, &paths(&["bad.json", "good.json"]));
        assert_eq!(set.file_count(), 2);
    }

    #[test]
    fn forgotten_paths_are_registered_again() {
        let mut backend = FakeBackend::default();
        let mut set = WatchSet::new(Path::new("/users"), false);
        set.sync(&mut backend, &paths(&["a.json"]));

        // The backend silently dropped both watches.
        backend.watched.clear();
        set.forget(Path::new("/users/a.json"));
        set.forget(Path::new("/users"));
        assert!(!set.is_root_watched());

        set.sync(&mut backend, &paths(&["a.json"]));
        assert!(set.is_root_watched());
        assert!(backend.watched.contains(Path::new("/users/a.json")));
    }
}
