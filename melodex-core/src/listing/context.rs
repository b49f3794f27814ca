use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use melodex_model::{CoverArtMap, Track};
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::ListingEvent;
use crate::extractor::MetadataExtractor;
use crate::fs::FileSystem;
use crate::listing::WatchMode;
use crate::listing::batcher::EmissionBatcher;
use crate::listing::snapshot::DirectorySnapshot;
use crate::listing::watcher::{WatchOutcome, WatchRegistry};

/// Per-instance scan state shared between the engine, the traversal, and the
/// backend. Counters and the degraded-watch accounting live here rather than
/// in globals, so engines over disjoint root sets stay independent.
pub struct ListingContext {
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) extractor: Arc<dyn MetadataExtractor>,
    pub(crate) snapshot: DirectorySnapshot,
    pub(crate) watches: WatchRegistry,
    pub(crate) batcher: EmissionBatcher,
    pub(crate) covers: CoverArtMap,
    pub(crate) events: mpsc::UnboundedSender<ListingEvent>,
    stop: Arc<AtomicBool>,
    watch_mode: WatchMode,
    handle_new_files: bool,
    imported_tracks: usize,
}

impl fmt::Debug for ListingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingContext")
            .field("snapshot_directories", &self.snapshot.directory_count())
            .field("watches", &self.watches)
            .field("pending_tracks", &self.batcher.pending_len())
            .field("covers", &self.covers.len())
            .field("imported_tracks", &self.imported_tracks)
            .field("handle_new_files", &self.handle_new_files)
            .finish()
    }
}

impl ListingContext {
    pub(crate) fn new(
        fs: Arc<dyn FileSystem>,
        extractor: Arc<dyn MetadataExtractor>,
        watches: WatchRegistry,
        events: mpsc::UnboundedSender<ListingEvent>,
        stop: Arc<AtomicBool>,
        watch_mode: WatchMode,
    ) -> Self {
        Self {
            fs,
            extractor,
            snapshot: DirectorySnapshot::new(),
            watches,
            batcher: EmissionBatcher::new(),
            covers: CoverArtMap::new(),
            events,
            stop,
            watch_mode,
            handle_new_files: true,
            imported_tracks: 0,
        }
    }

    /// True once a cooperative stop has been requested, possibly from
    /// another thread.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// The watch registrations this engine performs while scanning.
    pub fn watch_mode(&self) -> WatchMode {
        self.watch_mode
    }

    /// Whether newly discovered files are handed to the extractor at all.
    /// Removal detection runs either way.
    pub fn handles_new_files(&self) -> bool {
        self.handle_new_files
    }

    pub(crate) fn set_handle_new_files(&mut self, handle: bool) {
        self.handle_new_files = handle;
    }

    /// Accepted new files across the current refresh. Diagnostic only.
    pub fn imported_count(&self) -> usize {
        self.imported_tracks
    }

    pub(crate) fn reset_imported_count(&mut self) {
        self.imported_tracks = 0;
    }

    /// Send an event to the consumer. A gone receiver means the application
    /// is tearing down; the scan keeps unwinding on its own.
    pub fn emit(&self, event: ListingEvent) {
        let _ = self.events.send(event);
    }

    /// Best-effort watch registration; the first failure per instance emits
    /// the single `WatchDegraded` notification.
    pub fn watch_path(&mut self, path: &Path) {
        if self.watches.watch(path) == WatchOutcome::DegradedNow {
            debug!("watching degraded starting at {}", path.display());
            self.emit(ListingEvent::WatchDegraded);
        }
    }

    /// Record `child` in `dir`'s snapshot child set, registering `dir` (and,
    /// for roots, its parent) on first contact so removal of the root itself
    /// is observable from one level above.
    pub fn register_child(&mut self, dir: &Path, child: &Path, is_file: bool, mode: WatchMode) {
        if !self.snapshot.knows_directory(dir) {
            if mode.directories {
                self.watch_path(dir);
            }
            if let Some(parent) = dir.parent() {
                if !self.snapshot.knows_directory(parent) && mode.directories {
                    self.watch_path(parent);
                }
                self.snapshot.add_child(parent, dir, false);
            }
        }
        self.snapshot.add_child(dir, child, is_file);
    }

    /// Remember cover art for the track's album unless already cached.
    pub fn add_cover(&mut self, track: &Track) {
        let Some(album) = track.album.as_ref() else {
            return;
        };
        if self.covers.contains_key(album) {
            return;
        }
        if let Some(cover) = self.extractor.search_for_cover(&track.path) {
            self.covers.insert(album.clone(), cover);
        }
    }

    /// Queue one confirmed track for batched emission, flushing when the
    /// batch outgrows the adaptive threshold.
    pub fn queue_discovered(&mut self, track: Track) {
        self.imported_tracks += 1;
        if let Some(batch) = self.batcher.push(track) {
            self.flush_discovered(batch);
        }
    }

    /// Flush whatever the batcher still holds.
    pub fn flush_residual(&mut self) {
        if let Some(batch) = self.batcher.drain() {
            self.flush_discovered(batch);
        }
    }

    /// Emit a discovery batch. Flushed tracks are only now recorded as seen;
    /// a stop that discards a pending batch leaves those files stale and
    /// re-derivable by the next refresh.
    pub(crate) fn flush_discovered(&mut self, batch: Vec<Track>) {
        for track in &batch {
            self.snapshot.note_file_seen(&track.path, track.modified);
        }
        let covers = self.covers.clone();
        self.emit(ListingEvent::TracksDiscovered {
            tracks: batch,
            covers,
        });
    }

    /// Drop the pending batch after a stop unwound the scan.
    pub(crate) fn discard_pending(&mut self) {
        let dropped = self.batcher.discard();
        if dropped > 0 {
            debug!("discarded {dropped} unemitted tracks after stop");
        }
    }
}
