use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use melodex_model::{KnownFiles, Track};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ListingConfig;
use crate::events::ListingEvent;
use crate::extractor::MetadataExtractor;
use crate::fs::FileSystem;
use crate::listing::WatchMode;
use crate::listing::backend::ListingBackend;
use crate::listing::context::ListingContext;
use crate::listing::traversal::scan_directory_tree;
use crate::listing::watcher::{PathEvent, PathEventKind, WatchRegistry};

/// Cross-thread stop control for an engine whose scan loop runs elsewhere.
/// The flag is the only engine state another thread may touch.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a drained watch notification asks the engine to rescan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScanTarget {
    Directory(PathBuf),
    File(PathBuf),
}

/// Orchestrates one listing instance: owns the snapshot, the watch registry,
/// the batcher, and a backend, and drives them through the lifecycle
/// `init -> (restored_tracks ->) refresh / watch callbacks -> stop`.
///
/// All scan entry points are serialized by the caller; one engine never runs
/// two traversals at once.
pub struct ListingEngine {
    ctx: ListingContext,
    backend: Arc<dyn ListingBackend>,
    roots: Vec<PathBuf>,
    scan_at_startup: bool,
    is_active: bool,
    wait_end_track_removal: bool,
    stop: Arc<AtomicBool>,
    watch_events: mpsc::UnboundedReceiver<PathEvent>,
}

impl fmt::Debug for ListingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingEngine")
            .field("roots", &self.roots)
            .field("is_active", &self.is_active)
            .field("wait_end_track_removal", &self.wait_end_track_removal)
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl ListingEngine {
    /// Build an engine over `backend`. Outbound notifications flow into
    /// `events`; watch notifications arrive on an internal channel drained
    /// by [`ListingEngine::poll_watch_events`].
    pub fn new(
        config: &ListingConfig,
        backend: Arc<dyn ListingBackend>,
        fs: Arc<dyn FileSystem>,
        extractor: Arc<dyn MetadataExtractor>,
        events: mpsc::UnboundedSender<ListingEvent>,
    ) -> Self {
        let (watches, watch_events) = if config.watch_for_changes {
            WatchRegistry::new()
        } else {
            // No watcher, and a channel that never produces events.
            let (_tx, rx) = mpsc::unbounded_channel();
            (WatchRegistry::disconnected(), rx)
        };
        let watch_mode = if config.watch_for_changes {
            WatchMode::ALL
        } else {
            WatchMode::NONE
        };
        let stop = Arc::new(AtomicBool::new(false));

        Self {
            ctx: ListingContext::new(fs, extractor, watches, events, stop.clone(), watch_mode),
            backend,
            roots: config.roots.clone(),
            scan_at_startup: config.scan_at_startup,
            is_active: false,
            wait_end_track_removal: false,
            stop,
            watch_events,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Accepted new files across the current refresh. Diagnostic only.
    pub fn imported_count(&self) -> usize {
        self.ctx.imported_count()
    }

    pub fn set_roots(&mut self, roots: Vec<PathBuf>) {
        self.roots = roots;
    }

    /// Suppress discovery of new files while still detecting removals.
    pub fn set_handle_new_files(&mut self, handle: bool) {
        self.ctx.set_handle_new_files(handle);
    }

    /// Activate the engine. With scan-at-startup configured this asks the
    /// catalog for the persisted snapshot; scanning begins when
    /// [`ListingEngine::restored_tracks`] delivers it.
    pub fn init(&mut self) {
        debug!("listing engine init");
        self.is_active = true;
        self.stop.store(false, Ordering::Relaxed);
        if self.scan_at_startup {
            self.ctx.emit(ListingEvent::RestoredTracksRequested);
        }
    }

    /// Catalog's reply to `RestoredTracksRequested`: the persisted file map
    /// is loaded and a full refresh begins.
    pub async fn restored_tracks(&mut self, files: KnownFiles) {
        info!("restored {} known files", files.len());
        self.ctx.snapshot.replace_all_files(files);
        self.refresh().await;
    }

    /// Full pass over every configured root through the backend, followed by
    /// the never-re-observed removal pass.
    pub async fn refresh(&mut self) {
        self.ctx.reset_imported_count();
        self.ctx.emit(ListingEvent::IndexingStarted);

        let backend = Arc::clone(&self.backend);
        if let Err(e) = backend.refresh(&mut self.ctx, &self.roots).await {
            // A failed backend pass degrades to "no changes": partial
            // observations are kept and nothing is synthesized as removed.
            warn!("refresh failed: {}", e);
            self.ctx.snapshot.commit_partial();
            self.ctx.emit(ListingEvent::IndexingFinished);
            return;
        }

        if self.ctx.stop_requested() {
            self.ctx.snapshot.commit_partial();
            return;
        }

        info!("refresh imported {} tracks", self.ctx.imported_count());
        self.check_files_to_remove();
        if !self.wait_end_track_removal {
            self.ctx.emit(ListingEvent::IndexingFinished);
        }
    }

    /// Files restored at startup but never re-observed are confirmed
    /// deletions. The pass stays open until the catalog acknowledges them.
    fn check_files_to_remove(&mut self) {
        let leftover = self.ctx.snapshot.commit_full();
        debug!("{} known files were not re-observed", leftover.len());
        if !leftover.is_empty() {
            self.wait_end_track_removal = true;
            self.ctx.emit(ListingEvent::TracksRemoved { paths: leftover });
        }
    }

    /// Catalog acknowledgment that a removal batch was durably applied.
    pub fn removals_applied(&mut self) {
        if self.wait_end_track_removal {
            self.wait_end_track_removal = false;
            self.ctx.emit(ListingEvent::IndexingFinished);
        }
    }

    /// Scoped rescan of one subtree. Ignored unless `path` is a currently
    /// known directory.
    pub async fn directory_changed(&mut self, path: &Path) {
        if !self.ctx.snapshot.knows_directory(path) {
            return;
        }
        self.ctx.emit(ListingEvent::IndexingStarted);

        let backend = Arc::clone(&self.backend);
        let mode = self.ctx.watch_mode();
        scan_directory_tree(&mut self.ctx, backend.as_ref(), path, mode).await;
        self.ctx.snapshot.commit_partial();

        self.ctx.emit(ListingEvent::IndexingFinished);
    }

    /// Re-scan exactly one file through the same unchanged check a tree scan
    /// applies; a changed file is emitted as modified.
    pub async fn file_changed(&mut self, path: &Path) {
        let backend = Arc::clone(&self.backend);
        let mode = self.ctx.watch_mode();
        match backend.scan_one_file(&mut self.ctx, path, mode).await {
            Ok(Some(track)) => {
                self.ctx.snapshot.note_file_seen(path, track.modified);
                self.ctx.snapshot.commit_partial();
                let covers = self.ctx.covers.clone();
                self.ctx.emit(ListingEvent::TracksModified {
                    tracks: vec![track],
                    covers,
                });
            }
            Ok(None) => {}
            Err(e) => debug!("rescan of {} failed: {}", path.display(), e),
        }
    }

    /// Candidate supplied from outside the engine (for instance a track the
    /// catalog imported by other means). Emits a single-item update batch
    /// only when the extracted facts differ from the supplied ones.
    pub async fn new_track_file(&mut self, partial: &Track) {
        let backend = Arc::clone(&self.backend);
        let mode = self.ctx.watch_mode();
        match backend.scan_one_file(&mut self.ctx, &partial.path, mode).await {
            Ok(Some(track)) => {
                self.ctx.snapshot.note_file_seen(&partial.path, track.modified);
                self.ctx.snapshot.commit_partial();
                if track != *partial {
                    let covers = self.ctx.covers.clone();
                    self.ctx.emit(ListingEvent::TracksModified {
                        tracks: vec![track],
                        covers,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => debug!("rescan of {} failed: {}", partial.path.display(), e),
        }
    }

    /// Cooperative stop: an in-flight traversal observes the flag at each
    /// level and unwinds without emitting anything beyond what was already
    /// flushed.
    pub fn stop(&mut self) {
        info!("listing engine stop");
        self.is_active = false;
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Drain pending watch notifications and run the scans they call for.
    /// Targets are deduplicated per drain so an event burst under one
    /// directory costs one rescan. The caller serializes this with the
    /// other scan entry points.
    pub async fn poll_watch_events(&mut self) {
        let mut targets: Vec<ScanTarget> = Vec::new();
        let mut seen: HashSet<ScanTarget> = HashSet::new();
        while let Ok(event) = self.watch_events.try_recv() {
            if let Some(target) = self.classify_event(&event) {
                if seen.insert(target.clone()) {
                    targets.push(target);
                }
            }
        }

        for target in targets {
            match target {
                ScanTarget::Directory(dir) => self.directory_changed(&dir).await,
                ScanTarget::File(file) => self.file_changed(&file).await,
            }
        }
    }

    /// Map a raw watch notification onto a scan target. Appearing and
    /// disappearing paths re-list the containing directory; in-place changes
    /// re-scan the path itself.
    pub(crate) fn classify_event(&self, event: &PathEvent) -> Option<ScanTarget> {
        match event.kind {
            PathEventKind::Created | PathEventKind::Removed => {
                if let Some(parent) = event.path.parent() {
                    if self.ctx.snapshot.knows_directory(parent) {
                        return Some(ScanTarget::Directory(parent.to_path_buf()));
                    }
                }
                if self.ctx.snapshot.knows_directory(&event.path) {
                    Some(ScanTarget::Directory(event.path.clone()))
                } else {
                    None
                }
            }
            PathEventKind::Modified => {
                if self.ctx.snapshot.knows_directory(&event.path) {
                    Some(ScanTarget::Directory(event.path.clone()))
                } else {
                    Some(ScanTarget::File(event.path.clone()))
                }
            }
        }
    }
}
