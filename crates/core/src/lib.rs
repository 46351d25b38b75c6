//! CloudVault core library.
//!
//! This crate provides the storage and sync building blocks of the
//! CloudVault file-sync backend: fixed-size chunking for resumable uploads,
//! and conflict detection and resolution for edits reported by multiple
//! devices.

pub mod chunker;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;

// Re-exports for convenience.
pub use chunker::{Chunk, ChunkManifest, Chunker};
pub use config::VaultConfig;
pub use conflict::{Conflict, ConflictResolver, ConflictType, Strategy};
pub use errors::{ChunkError, ConflictError, CoreError};
pub use models::{Change, ChangeType};
