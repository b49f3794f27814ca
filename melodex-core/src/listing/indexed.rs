use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use melodex_model::Track;
use tracing::{debug, info};

use crate::error::Result;
use crate::listing::WatchMode;
use crate::listing::backend::ListingBackend;
use crate::listing::context::ListingContext;
use crate::listing::traversal::default_scan_one_file;

/// External desktop search service the indexed backend reads file facts
/// from. Implementations bridge to whatever indexer the platform offers.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Every audio file currently known to the index.
    async fn audio_files(&self) -> Result<Vec<PathBuf>>;

    /// Indexed metadata for one file, when the index has any.
    async fn lookup(&self, path: &Path) -> Result<Option<Track>>;
}

/// Backend that asks an external search index for file facts instead of
/// walking the trees itself.
///
/// The initial refresh takes everything from the index. Afterwards
/// single-file rescans go through the shared filesystem path, so
/// watch-driven updates behave exactly like the walking backend's and reuse
/// the same incremental machinery. Deletions surface through the shared
/// never-re-observed pass at the end of a full refresh.
pub struct IndexedBackend {
    index: Arc<dyn SearchIndex>,
    initial_scan: AtomicBool,
}

impl fmt::Debug for IndexedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedBackend")
            .field("initial_scan", &self.initial_scan.load(Ordering::Relaxed))
            .finish()
    }
}

impl IndexedBackend {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            initial_scan: AtomicBool::new(true),
        }
    }

    /// One file straight from the index: tag fallbacks, snapshot and watch
    /// registration, and sibling cover art.
    async fn scan_indexed_file(
        &self,
        ctx: &mut ListingContext,
        path: &Path,
        mode: WatchMode,
    ) -> Result<Option<Track>> {
        let Some(mut track) = self.index.lookup(path).await? else {
            debug!("search index has no document for {}", path.display());
            return Ok(None);
        };

        track.fill_artist_fallbacks();

        if let Some(dir) = path.parent() {
            ctx.register_child(dir, path, true, mode);
        }
        if mode.files {
            ctx.watch_path(path);
        }

        if let (Some(album), Some(dir)) = (track.album.clone(), path.parent()) {
            if !ctx.covers.contains_key(&album) {
                let candidate = dir.join("cover.jpg");
                if ctx.fs.path_exists(&candidate).await {
                    ctx.covers.insert(album, candidate);
                }
            }
        }

        Ok(Some(track))
    }
}

#[async_trait]
impl ListingBackend for IndexedBackend {
    async fn scan_one_file(
        &self,
        ctx: &mut ListingContext,
        path: &Path,
        mode: WatchMode,
    ) -> Result<Option<Track>> {
        if self.initial_scan.load(Ordering::Relaxed) {
            self.scan_indexed_file(ctx, path, mode).await
        } else {
            default_scan_one_file(ctx, path, mode).await
        }
    }

    async fn refresh(&self, ctx: &mut ListingContext, roots: &[PathBuf]) -> Result<()> {
        let files = self.index.audio_files().await?;
        info!("search index reported {} audio files", files.len());

        let mode = ctx.watch_mode();
        for path in files {
            if ctx.stop_requested() {
                break;
            }
            if !roots.is_empty() && !roots.iter().any(|root| path.starts_with(root)) {
                continue;
            }

            match self.scan_one_file(ctx, &path, mode).await {
                Ok(Some(track)) => ctx.queue_discovered(track),
                Ok(None) => {}
                Err(e) => debug!("skipping indexed file {}: {}", path.display(), e),
            }
        }

        if ctx.stop_requested() {
            ctx.discard_pending();
        } else {
            ctx.flush_residual();
            // From here on, rescans read the filesystem like the walking
            // backend does.
            self.initial_scan.store(false, Ordering::Relaxed);
        }

        Ok(())
    }
}
