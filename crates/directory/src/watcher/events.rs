//! Classification of raw notify events.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};

use crate::loader::Loader;
use crate::record::Identity;

/// Whether `event` can change what a load would produce.
pub(super) fn is_relevant<R: Identity>(event: &Event, loader: &Loader<R>) -> bool {
    let structural = match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            loader.is_recursive()
        }
        EventKind::Create(_)
        | EventKind::Remove(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Any => false,
        // Access, metadata-only changes and backend-specific noise.
        _ => return false,
    };

    structural
        || event
            .paths
            .iter()
            .any(|path| path == loader.root() || loader.is_record_file(path))
}

/// Paths the event reports as gone from their previous location.
pub(super) fn vanished_paths(event: &Event) -> impl Iterator<Item = &Path> {
    let gone = matches!(
        event.kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    event
        .paths
        .iter()
        .filter(move |_| gone)
        .map(PathBuf::as_path)
}
