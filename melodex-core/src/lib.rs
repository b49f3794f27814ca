//! # Melodex Core
//!
//! Core library for the Melodex music indexer: incremental directory
//! listing, change detection against a last-known snapshot, watch-driven
//! partial rescans, and batched emission of discovered tracks.
//!
//! ## Overview
//!
//! A [`listing::engine::ListingEngine`] owns one listing instance: the
//! directory snapshot, the watch registry, the adaptive emission batcher,
//! and a [`listing::backend::ListingBackend`] that supplies file facts.
//! Two backends ship with the crate:
//!
//! - [`listing::backend::FilesystemBackend`] walks the configured root
//!   trees directly.
//! - [`listing::indexed::IndexedBackend`] queries an external desktop
//!   search service and falls back to the filesystem for rescans.
//!
//! Tag reading is not part of this crate; the engine consumes it through
//! the [`extractor::MetadataExtractor`] capability. Discovered, modified,
//! and removed tracks flow to the catalog consumer as
//! [`events::ListingEvent`] values over an mpsc channel.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Listing configuration loading and defaults
pub mod config;

/// Error types and the crate-wide result alias
pub mod error;

/// Outbound notifications to the catalog consumer
pub mod events;

/// Capability boundary to the tag-reading layer
pub mod extractor;

/// Filesystem abstraction with a deterministic in-memory test double
pub mod fs;

/// The incremental listing engine itself
pub mod listing;

#[cfg(test)]
mod test_support;

pub use config::{ListingConfig, ListingConfigSource};
pub use error::{IndexerError, Result};
pub use events::ListingEvent;
pub use extractor::MetadataExtractor;
pub use fs::{FileSystem, FsMetadata, InMemoryFs, RealFs};
pub use listing::WatchMode;
pub use listing::backend::{FilesystemBackend, ListingBackend};
pub use listing::batcher::EmissionBatcher;
pub use listing::context::ListingContext;
pub use listing::engine::{ListingEngine, StopHandle};
pub use listing::indexed::{IndexedBackend, SearchIndex};
pub use listing::snapshot::DirectorySnapshot;
pub use listing::traversal::default_scan_one_file;
pub use listing::watcher::{PathEvent, PathEventKind, WatchOutcome, WatchRegistry};
