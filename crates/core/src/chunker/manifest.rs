//! Upload manifest: the expected shape of a complete chunk set.
//!
//! The storage service persists the manifest next to the chunks so that a
//! later merge can tell a complete set from a truncated one, and can check
//! the reassembled file against the checksum of the original upload.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunk::Chunk;
use crate::errors::ChunkError;

/// Per-chunk record in a [`ChunkManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u64,
    pub size: u64,
    pub checksum: String,
}

/// Description of a complete chunk set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Chunk size the stream was split with.
    pub chunk_size: usize,
    /// Length of the original stream in bytes.
    pub total_size: u64,
    /// SHA-256 of the whole stream, hex-encoded.
    pub checksum: String,
    /// One entry per chunk, in index order.
    pub chunks: Vec<ChunkEntry>,
}

impl ChunkManifest {
    /// Build a manifest from chunks already ordered densely by index.
    pub(crate) fn from_ordered(chunk_size: usize, ordered: &[&Chunk]) -> Self {
        let mut hasher = Sha256::new();
        let mut total_size = 0u64;
        let chunks = ordered
            .iter()
            .map(|chunk| {
                hasher.update(&chunk.data);
                total_size += chunk.data.len() as u64;
                ChunkEntry {
                    index: chunk.index,
                    size: chunk.size,
                    checksum: chunk.checksum.clone(),
                }
            })
            .collect();

        Self {
            chunk_size,
            total_size,
            checksum: hex::encode(hasher.finalize()),
            chunks,
        }
    }

    /// Number of chunks in a complete set.
    pub fn chunk_count(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// Check one chunk against its manifest entry and its own data.
    pub fn check_chunk(&self, chunk: &Chunk) -> Result<(), ChunkError> {
        let entry = usize::try_from(chunk.index)
            .ok()
            .and_then(|i| self.chunks.get(i))
            .filter(|entry| entry.index == chunk.index)
            .ok_or(ChunkError::IndexOutOfRange {
                index: chunk.index,
                count: self.chunk_count(),
            })?;

        let actual = chunk.data.len() as u64;
        if entry.size != actual || !chunk.size_matches() {
            return Err(ChunkError::SizeMismatch {
                index: chunk.index,
                declared: entry.size,
                actual,
            });
        }
        if entry.checksum != chunk.checksum || !chunk.verify() {
            return Err(ChunkError::ChecksumMismatch { index: chunk.index });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk::checksum;

    fn manifest_for(parts: &[&[u8]]) -> (ChunkManifest, Vec<Chunk>) {
        let chunks: Vec<Chunk> = parts
            .iter()
            .enumerate()
            .map(|(i, p)| Chunk::new(i as u64, p.to_vec()))
            .collect();
        let refs: Vec<&Chunk> = chunks.iter().collect();
        (ChunkManifest::from_ordered(4, &refs), chunks)
    }

    #[test]
    fn test_from_ordered_totals() {
        let (manifest, _) = manifest_for(&[b"abcd", b"efgh", b"ij"]);
        assert_eq!(manifest.total_size, 10);
        assert_eq!(manifest.chunk_count(), 3);
        assert_eq!(manifest.checksum, checksum(b"abcdefghij"));
        assert_eq!(manifest.chunks[2].size, 2);
    }

    #[test]
    fn test_check_chunk_accepts_matching() {
        let (manifest, chunks) = manifest_for(&[b"abcd", b"ef"]);
        for chunk in &chunks {
            assert!(manifest.check_chunk(chunk).is_ok());
        }
    }

    #[test]
    fn test_check_chunk_rejects_foreign_chunk() {
        let (manifest, _) = manifest_for(&[b"abcd", b"ef"]);
        let foreign = Chunk::new(1, b"zz".to_vec());
        assert!(matches!(
            manifest.check_chunk(&foreign),
            Err(ChunkError::ChecksumMismatch { index: 1 })
        ));
    }

    #[test]
    fn test_check_chunk_rejects_unknown_index() {
        let (manifest, _) = manifest_for(&[b"abcd"]);
        let extra = Chunk::new(5, b"abcd".to_vec());
        assert!(matches!(
            manifest.check_chunk(&extra),
            Err(ChunkError::IndexOutOfRange { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_manifest_json_round_trip() {
        let (manifest, _) = manifest_for(&[b"abcd", b"e"]);
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: ChunkManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
