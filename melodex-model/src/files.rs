use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// One member of a directory's last-known child set.
///
/// Equality and hashing cover both fields, so a path that changed kind
/// between scans (file replaced by a directory or the reverse) compares as a
/// different entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileSystemEntry {
    pub path: PathBuf,
    pub is_file: bool,
}

impl FileSystemEntry {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_file: true,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_file: false,
        }
    }
}

/// Last-known metadata-change times keyed by file path.
///
/// The catalog persists this map across runs and hands it back to a listing
/// engine at startup.
pub type KnownFiles = HashMap<PathBuf, DateTime<Utc>>;
