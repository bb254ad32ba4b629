//! Error types for FlowGuard

use std::time::Duration;

/// Result type alias using FlowGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for FlowGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing, extra or ill-typed feature columns
    #[error("schema error: {0}")]
    Schema(String),

    /// Encoder, scaler, fill-value or model artifact could not be loaded
    #[error("artifact load error: {0}")]
    ArtifactLoad(String),

    /// Optional model is not available; callers degrade instead of failing
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// A classifier stage exceeded its time budget
    #[error("model '{model}' timed out after {}ms", .elapsed.as_millis())]
    ModelTimeout { model: String, elapsed: Duration },

    /// Persisted cursor state or commit journal cannot be parsed
    #[error("state corruption: {0}")]
    StateCorruption(String),

    /// Probability or risk score outside its domain
    #[error("invalid score: {0}")]
    InvalidScore(f64),

    /// Batch cursor has consumed the whole dataset
    #[error("end of dataset: cursor at {chunk_start}, dataset has {len} records")]
    EndOfDataset { chunk_start: u64, len: u64 },

    /// Another writer holds the batch cursor
    #[error("batch cursor is locked: {0}")]
    CursorLocked(String),

    /// Persisted state changed underneath an in-flight batch
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Classifier execution errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a new artifact load error
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    /// Create a new model-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new state corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::StateCorruption(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Errors after which a caller may continue with reduced output
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_) | Self::ModelTimeout { .. })
    }
}
