use thiserror::Error;

/// Errors that can arise while reading, patching or migrating world documents.
#[derive(Debug, Error)]
pub enum RulesError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around JSON encoding and decoding errors.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, backups, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a document or pack that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when a version tag cannot be compared.
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    /// Returned when a patch addresses a path that cannot hold the value.
    #[error("invalid field path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A stored field holds a value no rule can interpret.
    #[error("unexpected shape at {path}: expected {expected}")]
    UnexpectedShape {
        path: String,
        expected: &'static str,
    },

    /// Status effect label without an entry in the toggle table.
    #[error("unknown status effect label: {0}")]
    UnknownLabel(String),

    /// Writes against a locked compendium pack.
    #[error("pack is locked: {0}")]
    PackLocked(String),

    /// Internal error (unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}
