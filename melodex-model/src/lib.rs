//! Core data model definitions shared across Melodex crates.
#![allow(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;
pub mod files;
pub mod track;

pub use error::{ModelError, Result as ModelResult};
pub use files::{FileSystemEntry, KnownFiles};
pub use track::{CoverArtMap, Track};
