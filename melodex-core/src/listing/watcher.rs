use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Raw path notification forwarded from the OS watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEvent {
    pub path: PathBuf,
    pub kind: PathEventKind,
}

/// Simplified event kinds; everything the engine cares about is whether a
/// path appeared, went away, or changed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathEventKind {
    Created,
    Modified,
    Removed,
}

/// Outcome of one watch-registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The path is registered (or already was).
    Watched,
    /// Registration failed and this is the registry's first failure; the
    /// caller surfaces the single degraded-watching notification.
    DegradedNow,
    /// Registration failed; the degradation was already reported.
    Failed,
}

/// Records which paths are under OS watch and forwards change notifications
/// into a channel. Watching is best-effort: a registration failure degrades
/// the engine (reported once) but never aborts a scan.
pub struct WatchRegistry {
    watcher: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
    degraded_reported: bool,
}

impl fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("connected", &self.watcher.is_some())
            .field("watched", &self.watched.len())
            .field("degraded_reported", &self.degraded_reported)
            .finish()
    }
}

impl WatchRegistry {
    /// Registry backed by the platform watcher. Notifications land in the
    /// returned channel. If the platform watcher cannot be created the
    /// registry starts disconnected and every registration fails (reported
    /// once, like any other watch failure).
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PathEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for path_event in convert_notify_event(event) {
                        // The receiver is gone during teardown; nothing to do.
                        if tx.send(path_event).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => error!("watch error: {:?}", e),
            },
            Config::default(),
        );

        let watcher = match watcher {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                error!("failed to create filesystem watcher: {}", e);
                None
            }
        };

        (
            Self {
                watcher,
                watched: HashSet::new(),
                degraded_reported: false,
            },
            rx,
        )
    }

    /// Registry with no OS watcher at all, for engines configured not to
    /// watch. Registrations fail (reported once) and no events are raised.
    pub fn disconnected() -> Self {
        Self {
            watcher: None,
            watched: HashSet::new(),
            degraded_reported: false,
        }
    }

    /// Register `path` with the OS watcher. Idempotent over the recorded
    /// watch set.
    pub fn watch(&mut self, path: &Path) -> WatchOutcome {
        if self.watched.contains(path) {
            return WatchOutcome::Watched;
        }

        let registered = match self.watcher.as_mut() {
            Some(watcher) => match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => true,
                Err(e) => {
                    debug!("watch registration failed for {}: {}", path.display(), e);
                    false
                }
            },
            None => false,
        };

        if registered {
            self.watched.insert(path.to_path_buf());
            return WatchOutcome::Watched;
        }

        if self.degraded_reported {
            WatchOutcome::Failed
        } else {
            self.degraded_reported = true;
            WatchOutcome::DegradedNow
        }
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

fn convert_notify_event(event: Event) -> Vec<PathEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => PathEventKind::Created,
        EventKind::Modify(_) => PathEventKind::Modified,
        EventKind::Remove(_) => PathEventKind::Removed,
        // Access notifications and catch-all kinds carry no change.
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| PathEvent { path, kind })
        .collect()
}
