use std::path::{Path, PathBuf};

use async_trait::async_trait;
use melodex_model::Track;
use tracing::warn;

use crate::error::Result;
use crate::listing::WatchMode;
use crate::listing::context::ListingContext;
use crate::listing::traversal::{default_scan_one_file, scan_directory_tree};

/// Origin of file facts behind the shared listing machinery.
///
/// The incremental diff, batching, snapshot, and lifecycle logic live once in
/// the engine; a backend only decides how a single file's facts are obtained
/// and how a full refresh is driven.
#[async_trait]
pub trait ListingBackend: Send + Sync {
    /// Obtain facts for one candidate file, honoring the unchanged check
    /// against the snapshot.
    async fn scan_one_file(
        &self,
        ctx: &mut ListingContext,
        path: &Path,
        mode: WatchMode,
    ) -> Result<Option<Track>>;

    /// Walk or query every configured root, emitting discoveries through
    /// `ctx` as they are confirmed.
    async fn refresh(&self, ctx: &mut ListingContext, roots: &[PathBuf]) -> Result<()>;
}

/// Backend that walks the real directory trees under the configured roots.
#[derive(Debug, Default)]
pub struct FilesystemBackend;

impl FilesystemBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ListingBackend for FilesystemBackend {
    async fn scan_one_file(
        &self,
        ctx: &mut ListingContext,
        path: &Path,
        mode: WatchMode,
    ) -> Result<Option<Track>> {
        default_scan_one_file(ctx, path, mode).await
    }

    async fn refresh(&self, ctx: &mut ListingContext, roots: &[PathBuf]) -> Result<()> {
        let mode = ctx.watch_mode();
        for root in roots {
            if ctx.stop_requested() {
                break;
            }
            if !ctx.fs.path_exists(root).await {
                warn!("library root does not exist: {}", root.display());
                continue;
            }
            scan_directory_tree(ctx, self, root, mode).await;
        }
        Ok(())
    }
}
