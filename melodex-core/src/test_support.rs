//! Hand-written doubles shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use melodex_model::Track;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::events::ListingEvent;
use crate::extractor::MetadataExtractor;
use crate::fs::InMemoryFs;
use crate::listing::WatchMode;
use crate::listing::context::ListingContext;
use crate::listing::watcher::WatchRegistry;

/// Extractor double: accepts a fixed extension set, titles tracks after the
/// file stem, and files them under an album named after the parent
/// directory.
pub(crate) struct StubExtractor {
    extensions: Vec<&'static str>,
    calls: AtomicUsize,
    cover_lookups: AtomicUsize,
    cover: Option<PathBuf>,
    stop_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

impl StubExtractor {
    pub(crate) fn new() -> Self {
        Self {
            extensions: vec!["mp3", "flac", "ogg", "m4a"],
            calls: AtomicUsize::new(0),
            cover_lookups: AtomicUsize::new(0),
            cover: None,
            stop_after: Mutex::new(None),
        }
    }

    pub(crate) fn with_cover(mut self, cover: PathBuf) -> Self {
        self.cover = Some(cover);
        self
    }

    /// Request a cooperative stop during the `n`-th extraction.
    pub(crate) fn stop_after(&self, n: usize, flag: Arc<AtomicBool>) {
        *self.stop_after.lock().unwrap() = Some((n, flag));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn cover_lookups(&self) -> usize {
        self.cover_lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MetadataExtractor for StubExtractor {
    fn should_scan_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    async fn extract(&self, path: &Path) -> Result<Option<Track>> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some((limit, flag)) = self.stop_after.lock().unwrap().as_ref() {
            if call >= *limit {
                flag.store(true, Ordering::Relaxed);
            }
        }

        let mut track = Track::from_path(path)?;
        track.album = path
            .parent()
            .and_then(|dir| dir.file_name())
            .map(|name| name.to_string_lossy().to_string());
        Ok(Some(track))
    }

    fn search_for_cover(&self, _track_path: &Path) -> Option<PathBuf> {
        self.cover_lookups.fetch_add(1, Ordering::Relaxed);
        self.cover.clone()
    }
}

/// Context over an in-memory filesystem with watching off; returns the event
/// receiver and the shared stop flag alongside.
pub(crate) fn new_context(
    fs: Arc<InMemoryFs>,
    extractor: Arc<StubExtractor>,
) -> (
    ListingContext,
    mpsc::UnboundedReceiver<ListingEvent>,
    Arc<AtomicBool>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let ctx = ListingContext::new(
        fs,
        extractor,
        WatchRegistry::disconnected(),
        tx,
        stop.clone(),
        WatchMode::NONE,
    );
    (ctx, rx, stop)
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ListingEvent>) -> Vec<ListingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub(crate) fn discovered_paths(events: &[ListingEvent]) -> Vec<PathBuf> {
    events
        .iter()
        .filter_map(|event| match event {
            ListingEvent::TracksDiscovered { tracks, .. } => Some(tracks),
            _ => None,
        })
        .flatten()
        .map(|track| track.path.clone())
        .collect()
}

pub(crate) fn removed_paths(events: &[ListingEvent]) -> Vec<PathBuf> {
    events
        .iter()
        .filter_map(|event| match event {
            ListingEvent::TracksRemoved { paths } => Some(paths.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}
