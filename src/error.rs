//! Error types for Resumo.
//!
//! Only validation, extraction and provider errors ever reach the caller as a
//! terminal failure event. Persistence and cleanup errors are logged by the
//! pipeline and absorbed once a transcription result has been secured.

use thiserror::Error;

/// Library-level error type for Resumo operations.
#[derive(Error, Debug)]
pub enum ResumoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("{0}")]
    MissingCredential(String),

    #[error("Provider rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),
}

/// Result type alias for Resumo operations.
pub type Result<T> = std::result::Result<T, ResumoError>;
