//! Crate-wide error type with stable CLI error codes.
//!
//! Every failure that crosses the command boundary is classified into one
//! of the fixed envelope codes; variants carry enough context to build the
//! `{code, message, hint}` error object without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PampaxError>;

/// Stable error codes surfaced in the CLI JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    IndexMissing,
    DbError,
    IoError,
    ConfigError,
    EmbeddingError,
    SearchError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::IndexMissing => "INDEX_MISSING",
            ErrorCode::DbError => "DB_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::EmbeddingError => "EMBEDDING_ERROR",
            ErrorCode::SearchError => "SEARCH_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Error type for all pampax operations.
#[derive(Debug, Error)]
pub enum PampaxError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no index found at {}", .0.display())]
    IndexMissing(PathBuf),

    #[error("database error: {0}")]
    Db(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// An encrypted chunk exists but no master key is configured.
    #[error("chunk {sha} is encrypted but no encryption key is configured")]
    EncryptionKeyMissing { sha: String },

    /// GCM tag verification failed: wrong key or tampered ciphertext.
    /// Kept separate from [`PampaxError::EncryptionKeyMissing`] so callers
    /// can distinguish a configuration problem from data corruption.
    #[error("chunk {sha} failed authentication: key mismatch or tampering")]
    ChunkAuthFailed { sha: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PampaxError {
    /// Convenience constructor for database failures.
    pub fn database(msg: impl Into<String>) -> Self {
        PampaxError::Db(msg.into())
    }

    /// Convenience constructor for input validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        PampaxError::InvalidInput(msg.into())
    }

    /// The envelope code this error surfaces under.
    pub fn code(&self) -> ErrorCode {
        match self {
            PampaxError::InvalidInput(_) => ErrorCode::InvalidInput,
            PampaxError::NotFound(_) => ErrorCode::NotFound,
            PampaxError::IndexMissing(_) => ErrorCode::IndexMissing,
            PampaxError::Db(_) => ErrorCode::DbError,
            PampaxError::Io(_) => ErrorCode::IoError,
            PampaxError::Config(_) | PampaxError::EncryptionKeyMissing { .. } => {
                ErrorCode::ConfigError
            }
            PampaxError::ChunkAuthFailed { .. } => ErrorCode::IoError,
            PampaxError::Embedding(_) => ErrorCode::EmbeddingError,
            PampaxError::Search(_) => ErrorCode::SearchError,
            PampaxError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// A short actionable hint for the CLI envelope, when one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            PampaxError::IndexMissing(path) => Some(format!(
                "run 'pampax index {}' to create the index first",
                path.display()
            )),
            PampaxError::EncryptionKeyMissing { .. } => Some(format!(
                "set {} to the 32-byte master key (base64 or hex)",
                crate::constants::ENV_ENCRYPTION_KEY
            )),
            PampaxError::ChunkAuthFailed { .. } => {
                Some("verify the encryption key matches the one used at index time".to_string())
            }
            PampaxError::InvalidInput(_) => Some("see 'pampax --help' for valid usage".to_string()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for PampaxError {
    fn from(e: rusqlite::Error) -> Self {
        PampaxError::Db(e.to_string())
    }
}

impl From<serde_json::Error> for PampaxError {
    fn from(e: serde_json::Error) -> Self {
        PampaxError::Internal(format!("JSON error: {e}"))
    }
}
