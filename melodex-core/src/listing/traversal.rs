use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use melodex_model::Track;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::ListingEvent;
use crate::listing::WatchMode;
use crate::listing::backend::ListingBackend;
use crate::listing::context::ListingContext;

/// Scan one root depth-first and flush whatever the walk accumulated, unless
/// a stop unwound it first.
pub(crate) async fn scan_directory_tree(
    ctx: &mut ListingContext,
    backend: &dyn ListingBackend,
    root: &Path,
    mode: WatchMode,
) {
    debug!("scanning tree rooted at {}", root.display());

    scan_directory(ctx, backend, root, mode).await;

    if ctx.stop_requested() {
        ctx.discard_pending();
    } else {
        ctx.flush_residual();
    }
}

enum ChildKind {
    Directory,
    File { changed: DateTime<Utc> },
}

/// Diff one directory against its snapshot and recurse into subdirectories.
///
/// Removals are emitted per call from the set difference against the
/// last-known child set; new and changed files go through the backend and
/// the adaptive batcher. Cancellation is checked at every recursion level
/// and every child.
pub(crate) fn scan_directory<'a>(
    ctx: &'a mut ListingContext,
    backend: &'a dyn ListingBackend,
    dir: &'a Path,
    mode: WatchMode,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        if ctx.stop_requested() {
            return;
        }

        if mode.directories && ctx.fs.path_exists(dir).await {
            ctx.watch_path(dir);
        }

        // Current children in OS enumeration order. A directory that
        // vanished or cannot be read lists as empty, which turns its whole
        // snapshot subtree into removals below. Entries that are neither
        // file nor directory (broken symlinks, sockets) are not tracked.
        let mut current: Vec<(PathBuf, ChildKind)> = Vec::new();
        match ctx.fs.read_dir(dir).await {
            Ok(mut entries) => loop {
                match entries.next_entry().await {
                    Ok(Some(path)) => {
                        let Ok(meta) = ctx.fs.metadata(&path).await else {
                            debug!("no metadata for {}, skipping", path.display());
                            continue;
                        };
                        if meta.is_dir {
                            current.push((path, ChildKind::Directory));
                        } else if meta.is_file {
                            let changed = meta
                                .change_time()
                                .map(DateTime::<Utc>::from)
                                .unwrap_or_else(Utc::now);
                            current.push((path, ChildKind::File { changed }));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("listing {} aborted: {}", dir.display(), e);
                        break;
                    }
                }
            },
            Err(e) => debug!("cannot list {}: {}", dir.display(), e),
        }

        let current_paths: HashSet<&Path> =
            current.iter().map(|(path, _)| path.as_path()).collect();

        let mut removed_tracks: Vec<PathBuf> = Vec::new();
        for entry in ctx.snapshot.children(dir) {
            if current_paths.contains(entry.path.as_path()) {
                continue;
            }
            if entry.is_file {
                ctx.snapshot.forget_file(&entry.path);
                removed_tracks.push(entry.path.clone());
            } else {
                ctx.snapshot.remove_subtree(&entry.path, &mut removed_tracks);
            }
            ctx.snapshot.remove_child(dir, &entry);
        }

        if !removed_tracks.is_empty() {
            ctx.emit(ListingEvent::TracksRemoved {
                paths: removed_tracks,
            });
        }

        if !ctx.handles_new_files() {
            return;
        }

        for (path, kind) in current {
            match kind {
                ChildKind::Directory => {
                    ctx.register_child(dir, &path, false, mode);
                    scan_directory(ctx, backend, &path, mode).await;

                    if ctx.stop_requested() {
                        break;
                    }
                }
                ChildKind::File { changed } => {
                    if let Some(recorded) = ctx.snapshot.file_timestamp(&path) {
                        if recorded >= changed {
                            ctx.snapshot.note_file_seen(&path, recorded);
                            debug!("{} not modified since last scan", path.display());
                            continue;
                        }
                    }

                    match backend.scan_one_file(ctx, &path, mode).await {
                        Ok(Some(track)) => {
                            if ctx.stop_requested() {
                                break;
                            }
                            ctx.add_cover(&track);
                            ctx.register_child(dir, &path, true, mode);
                            ctx.queue_discovered(track);
                        }
                        Ok(None) => debug!("{} is not a listable track", path.display()),
                        Err(e) => debug!("skipping {}: {}", path.display(), e),
                    }

                    if ctx.stop_requested() {
                        break;
                    }
                }
            }
        }
    })
}

/// Shared single-file scan: extractor gate, staleness check, extraction,
/// optional per-file watch. Both backends route their non-initial rescans
/// through here.
///
/// Only the unchanged case is recorded as seen here. Successful rescans are
/// recorded by the caller once the result has been handed to the consumer,
/// so a stop cannot strand a track that was extracted but never emitted.
pub async fn default_scan_one_file(
    ctx: &mut ListingContext,
    path: &Path,
    mode: WatchMode,
) -> Result<Option<Track>> {
    debug!("scanning {}", path.display());

    if !ctx.extractor.should_scan_file(path) {
        debug!("{} has an unsupported type", path.display());
        return Ok(None);
    }

    let meta = ctx
        .fs
        .metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file);

    if let Some(meta) = &meta {
        let changed = meta
            .change_time()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        if let Some(recorded) = ctx.snapshot.file_timestamp(path) {
            if recorded >= changed {
                ctx.snapshot.note_file_seen(path, recorded);
                debug!("{} not changed", path.display());
                return Ok(None);
            }
        }
    }

    let mut track = match ctx.extractor.extract(path).await {
        Ok(Some(track)) => track,
        Ok(None) => return Ok(None),
        Err(e) => {
            debug!("extraction failed for {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    if let Some(meta) = &meta {
        // Filesystem facts are authoritative over whatever the extractor put
        // in these fields.
        track.size = meta.len;
        track.modified = meta
            .change_time()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);

        if mode.files {
            ctx.watch_path(path);
        }
    }

    Ok(Some(track))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::listing::backend::FilesystemBackend;
    use crate::test_support::{
        StubExtractor, discovered_paths, drain, new_context, removed_paths,
    };
    use melodex_model::KnownFiles;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn test_initial_scan_discovers_tree() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/a.mp3", 10);
        fs.add_file("/music/sub/b.mp3", 20);
        fs.add_file("/music/notes.txt", 5);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs, extractor.clone());
        let backend = FilesystemBackend::new();

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        let events = drain(&mut rx);
        let mut found = discovered_paths(&events);
        found.sort();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/music/a.mp3"),
                PathBuf::from("/music/sub/b.mp3"),
            ]
        );
        assert!(removed_paths(&events).is_empty());
        assert_eq!(extractor.calls(), 2);
        assert_eq!(ctx.imported_count(), 2);
        assert!(ctx.snapshot.knows_directory(Path::new("/music/sub")));
    }

    #[tokio::test]
    async fn test_rescan_of_unchanged_tree_is_silent() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/a.mp3", 10);
        fs.add_file("/music/sub/b.mp3", 20);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs, extractor.clone());
        let backend = FilesystemBackend::new();

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;
        assert!(ctx.snapshot.commit_full().is_empty());
        drain(&mut rx);

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;
        assert!(ctx.snapshot.commit_full().is_empty());

        let events = drain(&mut rx);
        assert!(discovered_paths(&events).is_empty());
        assert!(removed_paths(&events).is_empty());
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_removing_subdirectory_cascades() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/sub/a.mp3", 10);
        fs.add_file("/music/sub/deep/b.mp3", 20);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs.clone(), extractor);
        let backend = FilesystemBackend::new();

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;
        ctx.snapshot.commit_full();
        drain(&mut rx);

        fs.remove("/music/sub");
        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        let events = drain(&mut rx);
        let mut removed = removed_paths(&events);
        removed.sort();
        assert_eq!(
            removed,
            vec![
                PathBuf::from("/music/sub/a.mp3"),
                PathBuf::from("/music/sub/deep/b.mp3"),
            ]
        );
        assert!(discovered_paths(&events).is_empty());
        // The leftover pass must not report the cascaded files again.
        assert!(ctx.snapshot.commit_full().is_empty());
    }

    #[tokio::test]
    async fn test_stale_timestamp_skips_extraction() {
        let changed = SystemTime::now();
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file_changed_at("/music/old.mp3", 10, changed);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs.clone(), extractor.clone());
        let backend = FilesystemBackend::new();

        let mut restored = KnownFiles::new();
        restored.insert(PathBuf::from("/music/old.mp3"), changed.into());
        ctx.snapshot.replace_all_files(restored);
        ctx.snapshot
            .add_child(Path::new("/music"), Path::new("/music/old.mp3"), true);

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        assert_eq!(extractor.calls(), 0);
        assert!(drain(&mut rx).is_empty());
        assert!(ctx.snapshot.commit_full().is_empty());

        // A later metadata change makes the same file eligible again.
        fs.set_changed("/music/old.mp3", changed + Duration::from_secs(5));
        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        assert_eq!(extractor.calls(), 1);
        let events = drain(&mut rx);
        assert_eq!(
            discovered_paths(&events),
            vec![PathBuf::from("/music/old.mp3")]
        );
    }

    #[tokio::test]
    async fn test_known_scenario_new_deleted_unchanged() {
        // roots = ["/music"]; a.mp3 is new, b.mp3 was deleted on disk,
        // sub/c.mp3 is unchanged and already known.
        let c_changed = SystemTime::now();
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/a.mp3", 10);
        fs.add_file_changed_at("/music/sub/c.mp3", 20, c_changed);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs, extractor.clone());
        let backend = FilesystemBackend::new();

        let mut restored = KnownFiles::new();
        restored.insert(PathBuf::from("/music/b.mp3"), SystemTime::now().into());
        restored.insert(PathBuf::from("/music/sub/c.mp3"), c_changed.into());
        ctx.snapshot.replace_all_files(restored);
        ctx.snapshot
            .add_child(Path::new("/music"), Path::new("/music/b.mp3"), true);
        ctx.snapshot
            .add_child(Path::new("/music"), Path::new("/music/sub"), false);
        ctx.snapshot
            .add_child(Path::new("/music/sub"), Path::new("/music/sub/c.mp3"), true);

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;
        let leftover = ctx.snapshot.commit_full();

        let events = drain(&mut rx);
        assert_eq!(discovered_paths(&events), vec![PathBuf::from("/music/a.mp3")]);
        assert_eq!(removed_paths(&events), vec![PathBuf::from("/music/b.mp3")]);
        assert_eq!(extractor.calls(), 1);
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn test_stop_mid_traversal_suppresses_unvisited_subtrees() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/sub1/a1.mp3", 10);
        fs.add_file("/music/sub1/a2.mp3", 10);
        fs.add_file("/music/sub2/b1.mp3", 10);
        fs.add_file("/music/sub2/b2.mp3", 10);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, stop) = new_context(fs, extractor.clone());
        extractor.stop_after(2, stop.clone());
        let backend = FilesystemBackend::new();

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;
        ctx.snapshot.commit_partial();

        // Nothing was emitted: the only pending batch was discarded by the
        // stop, and sub2 was never visited.
        let events = drain(&mut rx);
        assert!(discovered_paths(&events).is_empty());
        assert!(removed_paths(&events).is_empty());
        assert_eq!(extractor.calls(), 2);

        // Re-arming and rescanning heals the interrupted pass completely.
        stop.store(false, Ordering::Relaxed);
        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        let events = drain(&mut rx);
        let mut found = discovered_paths(&events);
        found.sort();
        assert_eq!(
            found,
            vec![
                PathBuf::from("/music/sub1/a1.mp3"),
                PathBuf::from("/music/sub1/a2.mp3"),
                PathBuf::from("/music/sub2/b1.mp3"),
                PathBuf::from("/music/sub2/b2.mp3"),
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_new_files_off_still_detects_removals() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/new.mp3", 10);

        let extractor = Arc::new(StubExtractor::new());
        let (mut ctx, mut rx, _stop) = new_context(fs, extractor.clone());
        ctx.set_handle_new_files(false);
        let backend = FilesystemBackend::new();

        ctx.snapshot
            .add_child(Path::new("/music"), Path::new("/music/gone.mp3"), true);

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        let events = drain(&mut rx);
        assert_eq!(removed_paths(&events), vec![PathBuf::from("/music/gone.mp3")]);
        assert!(discovered_paths(&events).is_empty());
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test]
    async fn test_cover_art_cached_per_album() {
        let fs = Arc::new(InMemoryFs::new());
        fs.add_file("/music/album/01.mp3", 10);
        fs.add_file("/music/album/02.mp3", 10);

        let extractor = Arc::new(
            StubExtractor::new().with_cover(PathBuf::from("/music/album/cover.jpg")),
        );
        let (mut ctx, mut rx, _stop) = new_context(fs, extractor.clone());
        let backend = FilesystemBackend::new();

        scan_directory_tree(&mut ctx, &backend, Path::new("/music"), WatchMode::NONE).await;

        let events = drain(&mut rx);
        let covers = events
            .iter()
            .find_map(|event| match event {
                ListingEvent::TracksDiscovered { covers, .. } => Some(covers.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            covers.get("album"),
            Some(&PathBuf::from("/music/album/cover.jpg"))
        );
        // One lookup per album, not per track.
        assert_eq!(extractor.cover_lookups(), 1);
    }
}
