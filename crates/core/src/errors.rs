//! Error types for the CloudVault core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Chunk errors
// ---------------------------------------------------------------------------

/// Integrity and I/O errors from splitting, verifying, and merging chunks.
///
/// None of these are retried inside the chunker; the upload orchestrator
/// decides whether to re-request a chunk.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A chunker was configured with a zero chunk size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// The chunk set has a gap at this index.
    #[error("chunk set is incomplete: missing chunk {index}")]
    MissingChunk { index: u64 },

    /// Two chunks in the set share this index.
    #[error("chunk set is inconsistent: duplicate chunk {index}")]
    DuplicateChunk { index: u64 },

    /// The chunk's data does not hash to its recorded checksum.
    #[error("checksum mismatch for chunk {index}")]
    ChecksumMismatch { index: u64 },

    /// The chunk's cached size disagrees with its data.
    #[error("size mismatch for chunk {index}: declared {declared}, actual {actual}")]
    SizeMismatch {
        index: u64,
        declared: u64,
        actual: u64,
    },

    /// A chunk index past the end of the stream was requested.
    #[error("chunk index {index} out of range (stream has {count} chunks)")]
    IndexOutOfRange { index: u64, count: u64 },

    /// The chunk set disagrees with its manifest.
    #[error("chunk set does not match manifest: {0}")]
    ManifestMismatch(String),

    /// Reading the source stream failed.
    #[error("chunk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from conflict detection and resolution.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// No strategy is registered under the requested name.
    #[error("unknown conflict resolution strategy '{0}'")]
    UnknownStrategy(String),

    /// Both sides made divergent edits that cannot be reconciled
    /// automatically. This is an expected outcome that needs a human, not a
    /// software fault.
    #[error("conflict on file '{file_id}' needs manual resolution: {detail}")]
    Unresolvable {
        file_id: String,
        detail: String,
        /// Marker-annotated content from a failed line-level merge, if one
        /// was attempted.
        conflicted: Option<Vec<u8>>,
    },

    /// A change record is not usable for resolution.
    #[error("invalid change: {0}")]
    InvalidChange(String),
}

impl ConflictError {
    /// `true` for the "needs manual resolution" outcome.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::Unresolvable { .. })
    }

    /// Attach the file identity to a failed content merge.
    pub fn from_merge(file_id: &str, err: MergeConflict) -> Self {
        Self::Unresolvable {
            file_id: file_id.to_string(),
            detail: err.to_string(),
            conflicted: err.conflicted,
        }
    }
}

/// A three-way merge found divergent edits on both sides.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct MergeConflict {
    /// What made the merge fail.
    pub reason: String,
    /// Marker-annotated output from a line-level merge attempt.
    pub conflicted: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
