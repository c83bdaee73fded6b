// src/domain/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackageError {
    // lifecycle
    #[error("Collection not initialized: call init() first")]
    NotInitialized,
    #[error("Collection already closed")]
    Closed,
    #[error("Package already finalized")]
    AlreadyFinalized,
    #[error("Archive engine stopped before the operation completed")]
    EngineStopped,

    // input validation
    #[error("Model not found: {0}")]
    ModelNotFound(i64),
    #[error("Deck not found: {0}")]
    DeckNotFound(i64),
    #[error("Note has {actual} fields but model {model_id} expects {expected}")]
    FieldCountMismatch {
        model_id: i64,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    // upstream resources
    #[error("Media file not found: {0}")]
    MediaNotFound(String),
    #[error("Invalid media path: {0}")]
    InvalidMediaPath(String),
    #[error("Failed to stream media file {filename}: {source}")]
    MediaStream {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackageError {
    /// Wrong call for the current lifecycle state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::Closed | Self::AlreadyFinalized
        )
    }
}
