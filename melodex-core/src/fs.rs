use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;

/// Minimal, async-capable filesystem abstraction used by the listing engine.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Check whether a path exists.
    async fn path_exists(&self, path: &Path) -> bool;

    /// Open a directory for iteration.
    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>, String>;

    /// Fetch lightweight file metadata.
    async fn metadata(&self, path: &Path) -> Result<FsMetadata, String>;
}

/// Lightweight metadata needed by the listing engine.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    /// Content-modify time if available
    pub modified: Option<SystemTime>,
    /// Metadata-change time if available (ctime on unix). Also moves on
    /// permission and ownership changes that leave the content mtime alone.
    pub changed: Option<SystemTime>,
}

impl FsMetadata {
    /// Best available change timestamp: metadata-change time, else content
    /// mtime.
    pub fn change_time(&self) -> Option<SystemTime> {
        self.changed.or(self.modified)
    }
}

/// Async directory iterator (similar to tokio::fs::ReadDir).
#[async_trait]
pub trait ReadDirStream {
    /// Return next entry's path, or None when exhausted.
    async fn next_entry(&mut self) -> Result<Option<PathBuf>, String>;
}

/// Real filesystem implementation backed by tokio::fs.
#[derive(Debug, Default)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn metadata_change_time(md: &std::fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = md.ctime();
    if secs < 0 {
        return None;
    }
    SystemTime::UNIX_EPOCH
        .checked_add(std::time::Duration::new(secs as u64, md.ctime_nsec() as u32))
}

#[cfg(not(unix))]
fn metadata_change_time(md: &std::fs::Metadata) -> Option<SystemTime> {
    md.modified().ok()
}

#[async_trait]
impl FileSystem for RealFs {
    async fn path_exists(&self, path: &Path) -> bool {
        // try_exists avoids errors for permission issues by returning false
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>, String> {
        let rd = tokio::fs::read_dir(path)
            .await
            .map_err(|e| format!("read_dir failed for {:?}: {}", path, e))?;
        Ok(Box::new(RealReadDir { inner: rd }))
    }

    async fn metadata(&self, path: &Path) -> Result<FsMetadata, String> {
        let md = tokio::fs::metadata(path)
            .await
            .map_err(|e| format!("metadata failed for {:?}: {}", path, e))?;
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            is_file: md.is_file(),
            len: md.len(),
            modified: md.modified().ok(),
            changed: metadata_change_time(&md),
        })
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> Result<Option<PathBuf>, String> {
        match self.inner.next_entry().await {
            Ok(Some(entry)) => Ok(Some(entry.path())),
            Ok(None) => Ok(None),
            Err(e) => Err(format!("next_entry failed: {}", e)),
        }
    }
}

/// In-memory filesystem for tests.
///
/// Paths are treated literally; callers should use consistent absolute or
/// relative paths. Children list in insertion order so traversal-dependent
/// assertions stay deterministic, and nodes can be mutated after the fs has
/// been shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    nodes: RwLock<HashMap<PathBuf, Node>>,
}

#[derive(Debug, Clone)]
enum Node {
    Dir { children: Vec<PathBuf> },
    File { len: u64, changed: SystemTime },
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut nodes = self.nodes.write().unwrap();
        if nodes.contains_key(&path) {
            return;
        }
        Self::ensure_parent_link(&mut nodes, &path);
        nodes.insert(
            path,
            Node::Dir {
                children: Vec::new(),
            },
        );
    }

    /// Add a file whose change time is the moment of insertion.
    pub fn add_file<P: Into<PathBuf>>(&self, path: P, len: u64) {
        self.add_file_changed_at(path, len, SystemTime::now());
    }

    pub fn add_file_changed_at<P: Into<PathBuf>>(&self, path: P, len: u64, changed: SystemTime) {
        let path = path.into();
        let mut nodes = self.nodes.write().unwrap();
        Self::ensure_parent_link(&mut nodes, &path);
        nodes.insert(path, Node::File { len, changed });
    }

    /// Bump a file's metadata-change time, as an edit or chmod would.
    pub fn set_changed<P: AsRef<Path>>(&self, path: P, changed: SystemTime) {
        let mut nodes = self.nodes.write().unwrap();
        if let Some(Node::File { changed: slot, .. }) = nodes.get_mut(path.as_ref()) {
            *slot = changed;
        }
    }

    /// Remove a file or a whole directory subtree.
    pub fn remove<P: AsRef<Path>>(&self, path: P) {
        let path = path.as_ref();
        let mut nodes = self.nodes.write().unwrap();
        Self::remove_node(&mut nodes, path);
        if let Some(parent) = path.parent() {
            if let Some(Node::Dir { children }) = nodes.get_mut(parent) {
                children.retain(|child| child.as_path() != path);
            }
        }
    }

    fn remove_node(nodes: &mut HashMap<PathBuf, Node>, path: &Path) {
        match nodes.remove(path) {
            Some(Node::Dir { children }) => {
                for child in children {
                    Self::remove_node(nodes, &child);
                }
            }
            Some(Node::File { .. }) | None => {}
        }
    }

    fn ensure_parent_link(nodes: &mut HashMap<PathBuf, Node>, path: &Path) {
        if let Some(parent) = path.parent() {
            // Ensure parent directory exists
            if !nodes.contains_key(parent) {
                nodes.insert(
                    parent.to_path_buf(),
                    Node::Dir {
                        children: Vec::new(),
                    },
                );
                // Recurse to ensure its parent exists
                Self::ensure_parent_link(nodes, parent);
            }
            // Link child into parent
            if let Some(Node::Dir { children }) = nodes.get_mut(parent) {
                if !children.iter().any(|p| p.as_path() == path) {
                    children.push(path.to_path_buf());
                }
            }
        }
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn path_exists(&self, path: &Path) -> bool {
        self.nodes.read().unwrap().contains_key(path)
    }

    async fn read_dir(&self, path: &Path) -> Result<Box<dyn ReadDirStream + Send>, String> {
        match self.nodes.read().unwrap().get(path) {
            Some(Node::Dir { children }) => Ok(Box::new(InMemReadDir {
                queue: children.clone().into(),
            })),
            Some(Node::File { .. }) => Err(format!("read_dir on file: {:?}", path)),
            None => Err(format!("read_dir on missing path: {:?}", path)),
        }
    }

    async fn metadata(&self, path: &Path) -> Result<FsMetadata, String> {
        match self.nodes.read().unwrap().get(path) {
            Some(Node::Dir { .. }) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: None,
                changed: None,
            }),
            Some(Node::File { len, changed }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                len: *len,
                modified: Some(*changed),
                changed: Some(*changed),
            }),
            None => Err(format!("metadata on missing path: {:?}", path)),
        }
    }
}

struct InMemReadDir {
    queue: VecDeque<PathBuf>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> Result<Option<PathBuf>, String> {
        Ok(self.queue.pop_front())
    }
}
