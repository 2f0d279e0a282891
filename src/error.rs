//! Error types for report-ingest

use thiserror::Error;

/// Main error type for report-ingest operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Document has no pages")]
    NoPages,

    #[error("No extractable text on the first page")]
    NoText,

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not initialized: run 'report-ingest init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for report-ingest
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}
