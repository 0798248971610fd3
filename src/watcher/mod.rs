//! File watcher that turns workspace changes into rebuild triggers.
//!
//! notify delivers events on a std channel; a blocking bridge task classifies
//! them and forwards triggers to a tokio channel. There is no debouncing: a
//! burst of saves produces a burst of triggers, and
//! [`run_triggers`](crate::session::run_triggers) folds whatever queued up
//! during a build into the next one.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::provider::lexical::SKIP_DIRS;
use crate::Result;

/// Why a rebuild was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildTrigger {
    Saved(PathBuf),
    Created(PathBuf),
    Deleted(PathBuf),
    Renamed(PathBuf),
}

impl RebuildTrigger {
    pub fn path(&self) -> &Path {
        match self {
            Self::Saved(p) | Self::Created(p) | Self::Deleted(p) | Self::Renamed(p) => p,
        }
    }
}

impl std::fmt::Display for RebuildTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Saved(_) => "saved",
            Self::Created(_) => "created",
            Self::Deleted(_) => "deleted",
            Self::Renamed(_) => "renamed",
        };
        write!(f, "{} {}", verb, self.path().display())
    }
}

/// Handle to a running watcher. Dropping it stops watching.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    _bridge_task: JoinHandle<()>,
}

/// Watch `root` recursively and yield a trigger for every relevant change.
pub fn start_watcher(
    root: &Path,
    extension: &str,
) -> Result<(WatcherHandle, tokio_mpsc::Receiver<RebuildTrigger>)> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<Event>>();

    let mut watcher = RecommendedWatcher::new(std_tx, Config::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    tracing::info!("Watching {} for .{} changes", root.display(), extension);

    let (tokio_tx, tokio_rx) = tokio_mpsc::channel::<RebuildTrigger>(256);

    let root = root.to_path_buf();
    let extension = extension.trim_start_matches('.').to_string();
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(event) => {
                    for trigger in classify_event(&event, &root, &extension) {
                        if tokio_tx.blocking_send(trigger).is_err() {
                            return; // receiver dropped
                        }
                    }
                }
                Err(e) => tracing::warn!("watch error: {}", e),
            }
        }
    });

    Ok((
        WatcherHandle {
            _watcher: watcher,
            _bridge_task: bridge_task,
        },
        tokio_rx,
    ))
}

/// Map one notify event to rebuild triggers.
///
/// Saves and creations count only for source files. Renames and removals
/// count for any path, since a moved directory can carry sources with it.
/// Anything inside tool or VCS directories is ignored.
pub fn classify_event(event: &Event, root: &Path, extension: &str) -> Vec<RebuildTrigger> {
    event
        .paths
        .iter()
        .filter(|path| !in_skipped_dir(path, root))
        .filter_map(|path| {
            let is_source = has_extension(path, extension);
            match event.kind {
                EventKind::Create(_) if is_source => Some(RebuildTrigger::Created(path.clone())),
                EventKind::Modify(ModifyKind::Name(_)) => Some(RebuildTrigger::Renamed(path.clone())),
                EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) if is_source => {
                    Some(RebuildTrigger::Saved(path.clone()))
                }
                EventKind::Remove(_) => Some(RebuildTrigger::Deleted(path.clone())),
                _ => None,
            }
        })
        .collect()
}

fn in_skipped_dir(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|c| SKIP_DIRS.iter().any(|skip| c.as_os_str() == *skip))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    fn classify(kind: EventKind, path: &str) -> Vec<RebuildTrigger> {
        classify_event(&event(kind, path), Path::new("/ws"), "dart")
    }

    #[test]
    fn test_save_of_source_triggers() {
        let triggers = classify(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/ws/lib/editor.dart",
        );
        assert_eq!(
            triggers,
            vec![RebuildTrigger::Saved(PathBuf::from("/ws/lib/editor.dart"))]
        );
    }

    #[test]
    fn test_save_of_other_file_ignored() {
        let triggers = classify(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/ws/README.md",
        );
        assert!(triggers.is_empty());
        assert!(classify(EventKind::Create(CreateKind::File), "/ws/pubspec.yaml").is_empty());
    }

    #[test]
    fn test_metadata_change_ignored() {
        let triggers = classify(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            "/ws/lib/editor.dart",
        );
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_rename_and_delete_of_directories_trigger() {
        let renamed = classify(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            "/ws/lib/widgets",
        );
        assert_eq!(renamed, vec![RebuildTrigger::Renamed(PathBuf::from("/ws/lib/widgets"))]);

        let deleted = classify(EventKind::Remove(RemoveKind::Any), "/ws/lib/old.dart");
        assert_eq!(deleted, vec![RebuildTrigger::Deleted(PathBuf::from("/ws/lib/old.dart"))]);
    }

    #[test]
    fn test_tool_directories_skipped() {
        assert!(classify(EventKind::Create(CreateKind::File), "/ws/.dart_tool/gen.dart").is_empty());
        assert!(classify(EventKind::Remove(RemoveKind::Any), "/ws/build/app.dart").is_empty());
    }

    #[test]
    fn test_root_named_like_skipped_dir_still_watched() {
        let triggers = classify_event(
            &event(EventKind::Create(CreateKind::File), "/home/build/app/lib/a.dart"),
            Path::new("/home/build/app"),
            "dart",
        );
        assert_eq!(triggers.len(), 1);
    }

    #[test]
    fn test_trigger_display() {
        let trigger = RebuildTrigger::Saved(PathBuf::from("/ws/lib/a.dart"));
        assert_eq!(trigger.to_string(), "saved /ws/lib/a.dart");
    }
}
