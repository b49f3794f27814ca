use std::path::{Path, PathBuf};

use async_trait::async_trait;
use melodex_model::Track;

use crate::Result;

/// Capability boundary to the tag-reading layer.
///
/// The listing engine never opens media files itself; everything it knows
/// about a file's content comes through this trait. Implementations live
/// with the catalog side of the application.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    /// Cheap pre-filter: does this path look like something worth opening?
    fn should_scan_file(&self, path: &Path) -> bool;

    /// Extract track facts from one file.
    ///
    /// `Ok(None)` means the extractor declines the file (unsupported type).
    /// Errors are treated the same way by callers: the file is skipped this
    /// pass and picked up again on the next scan or watch event.
    async fn extract(&self, path: &Path) -> Result<Option<Track>>;

    /// Look for cover art stored next to the given track file.
    fn search_for_cover(&self, track_path: &Path) -> Option<PathBuf>;
}
