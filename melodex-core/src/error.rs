use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid track: {0}")]
    InvalidTrack(#[from] melodex_model::ModelError),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Search index error: {0}")]
    SearchIndex(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
