use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ModelError, Result};

/// Cover art paths keyed by album name.
pub type CoverArtMap = HashMap<String, PathBuf>;

/// Facts extracted from a single music file.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    pub id: Uuid,
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// Playback length in whole seconds, when the extractor reports one.
    pub duration_secs: Option<u64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    /// User rating in the 0-10 range carried by some tag formats.
    pub rating: Option<u8>,
    pub size: u64,
    /// Metadata-change time observed when the file was scanned.
    pub modified: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
}

impl Track {
    /// Minimal track for `path`, titled after the file stem until tags say
    /// otherwise.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .ok_or_else(|| {
                ModelError::InvalidTrack(format!("path has no file name: {}", path.display()))
            })?;

        Ok(Self {
            id: Uuid::now_v7(),
            path,
            title,
            artist: None,
            album: None,
            album_artist: None,
            track_number: None,
            disc_number: None,
            duration_secs: None,
            genre: None,
            year: None,
            rating: None,
            size: 0,
            modified: Utc::now(),
            discovered_at: Utc::now(),
        })
    }

    /// Fill a missing artist from the album artist and the reverse, the way
    /// loosely tagged files are usually reconciled.
    pub fn fill_artist_fallbacks(&mut self) {
        if self.album_artist.is_none() {
            self.album_artist = self.artist.clone();
        }
        if self.artist.is_none() {
            self.artist = self.album_artist.clone();
        }
    }
}

/// Content comparison: two scans of the same file are equal when every
/// extracted fact matches. The generated `id` and the discovery time are
/// bookkeeping, not content.
impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.album_artist == other.album_artist
            && self.track_number == other.track_number
            && self.disc_number == other.disc_number
            && self.duration_secs == other.duration_secs
            && self.genre == other.genre
            && self.year == other.year
            && self.rating == other.rating
            && self.size == other.size
            && self.modified == other.modified
    }
}
