use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use melodex_model::{FileSystemEntry, KnownFiles};

/// Last-known view of the watched trees: per-directory child sets plus the
/// pending-deletion file map. Pure container, no I/O; the traversal decides
/// what the contents mean.
///
/// `known_files` always reflects the last completed scan. Confirmations made
/// by an in-flight traversal accumulate in `seen_files` and only move over
/// through one of the commit methods, so readers during a scan observe
/// transient staleness rather than partial state.
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    directories: HashMap<PathBuf, HashSet<FileSystemEntry>>,
    /// Files from the last completed scan that have not been re-observed.
    known_files: KnownFiles,
    /// Files confirmed by the traversal currently in flight.
    seen_files: KnownFiles,
}

impl DirectorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knows_directory(&self, dir: &Path) -> bool {
        self.directories.contains_key(dir)
    }

    /// Last-known children of `dir`; empty if the directory is unknown.
    pub fn children(&self, dir: &Path) -> HashSet<FileSystemEntry> {
        self.directories.get(dir).cloned().unwrap_or_default()
    }

    /// Record `child` under `dir`. A path is canonical within a child set:
    /// an existing entry for the same path with the opposite kind is
    /// replaced.
    pub fn add_child(&mut self, dir: &Path, child: &Path, is_file: bool) {
        let children = self.directories.entry(dir.to_path_buf()).or_default();
        children.remove(&FileSystemEntry {
            path: child.to_path_buf(),
            is_file: !is_file,
        });
        children.insert(FileSystemEntry {
            path: child.to_path_buf(),
            is_file,
        });
    }

    pub fn remove_child(&mut self, dir: &Path, entry: &FileSystemEntry) {
        if let Some(children) = self.directories.get_mut(dir) {
            children.remove(entry);
        }
    }

    /// Purge a directory and everything below it, collecting the file paths
    /// that disappear. A removed directory's contents are never individually
    /// re-observed as missing; only the directory itself is. Purged files are
    /// also dropped from the pending-deletion view so the end-of-refresh
    /// leftover pass cannot report them a second time.
    pub fn remove_subtree(&mut self, dir: &Path, removed_files: &mut Vec<PathBuf>) {
        let Some(children) = self.directories.remove(dir) else {
            return;
        };
        for entry in children {
            if entry.is_file {
                self.forget_file(&entry.path);
                removed_files.push(entry.path);
            } else {
                self.remove_subtree(&entry.path, removed_files);
            }
        }
    }

    /// Recorded metadata-change time for a file, consulting the last
    /// completed scan first and the in-flight confirmations second.
    pub fn file_timestamp(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.known_files
            .get(path)
            .or_else(|| self.seen_files.get(path))
            .copied()
    }

    /// Confirm a file: it leaves the pending-deletion view and is recorded
    /// for the next completed-scan snapshot.
    pub fn note_file_seen(&mut self, path: &Path, changed: DateTime<Utc>) {
        self.known_files.remove(path);
        self.seen_files.insert(path.to_path_buf(), changed);
    }

    /// Drop a file from both views without confirming it anywhere.
    pub fn forget_file(&mut self, path: &Path) {
        self.known_files.remove(path);
        self.seen_files.remove(path);
    }

    /// Bulk load of the persisted file map at engine init.
    pub fn replace_all_files(&mut self, files: KnownFiles) {
        self.known_files = files;
        self.seen_files.clear();
    }

    /// Fold the in-flight confirmations back into the last-known view after
    /// a scoped or interrupted scan. Nothing is reported removed.
    pub fn commit_partial(&mut self) {
        let seen = std::mem::take(&mut self.seen_files);
        self.known_files.extend(seen);
    }

    /// Complete a full-tree scan: the paths never re-observed are returned
    /// as confirmed deletions and the confirmations become the new
    /// last-known view.
    pub fn commit_full(&mut self) -> Vec<PathBuf> {
        let leftover: Vec<PathBuf> = self.known_files.keys().cloned().collect();
        self.known_files = std::mem::take(&mut self.seen_files);
        leftover
    }

    pub fn known_file_count(&self) -> usize {
        self.known_files.len()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }
}
