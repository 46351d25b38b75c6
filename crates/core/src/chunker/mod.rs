//! Fixed-size chunking for resumable uploads.
//!
//! A [`Chunker`] splits an upload stream into consecutive chunks of
//! `chunk_size` bytes (the last may be shorter), each carrying its index and
//! a SHA-256 checksum, and merges a chunk set back into the original stream.
//!
//! The chunker holds only immutable configuration, so a single instance can
//! be shared across threads without locking.
//!
//! # Merge rules
//!
//! | Chunk set | Result |
//! |-----------|--------|
//! | Indices dense `0..N` | Data concatenated in index order |
//! | Gap at index `i` | `MissingChunk { index: i }` |
//! | Index `i` seen twice | `DuplicateChunk { index: i }` |
//! | Cached size disagrees with data | `SizeMismatch` |
//! | Checksum disagrees with data (when verifying) | `ChecksumMismatch` |
//!
//! The caller's slice is never reordered; merging works on a sorted list of
//! references.

mod chunk;
mod manifest;

use std::cmp::Ordering;
use std::io::{self, Cursor, Read};
use std::ops::Range;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub use chunk::{checksum, Chunk};
pub use manifest::{ChunkEntry, ChunkManifest};

use crate::config::ChunkingConfig;
use crate::errors::ChunkError;

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Splits streams into fixed-size chunks and reassembles them.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    verify_on_merge: bool,
}

impl Chunker {
    /// Create a chunker. `chunk_size` must be positive.
    pub fn new(chunk_size: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize);
        }
        Ok(Self {
            chunk_size,
            verify_on_merge: true,
        })
    }

    /// Create a chunker from the `[chunking]` config section.
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkError> {
        let mut chunker = Self::new(config.chunk_size)?;
        chunker.verify_on_merge = config.verify_on_merge;
        Ok(chunker)
    }

    /// Skip (or restore) checksum verification during [`merge`](Self::merge).
    pub fn with_verify_on_merge(mut self, verify: bool) -> Self {
        self.verify_on_merge = verify;
        self
    }

    /// The configured chunk size in bytes.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    // -----------------------------------------------------------------------
    // Splitting
    // -----------------------------------------------------------------------

    /// Read `reader` to the end and split it into chunks.
    ///
    /// An empty stream yields no chunks, and a stream whose length is an
    /// exact multiple of the chunk size yields no trailing empty chunk.
    pub fn split<R: Read>(&self, mut reader: R) -> Result<Vec<Chunk>, ChunkError> {
        let mut chunks = Vec::new();
        let mut total = 0u64;

        loop {
            let buf = read_chunk(&mut reader, self.chunk_size)?;
            let filled = buf.len();
            if filled == 0 {
                break;
            }
            total += filled as u64;
            chunks.push(Chunk::new(chunks.len() as u64, buf));
            if filled < self.chunk_size {
                break;
            }
        }

        info!(
            chunks = chunks.len(),
            bytes = total,
            chunk_size = self.chunk_size,
            "split stream into chunks"
        );
        Ok(chunks)
    }

    /// Split an in-memory buffer into chunks.
    pub fn split_bytes(&self, data: &[u8]) -> Vec<Chunk> {
        data.chunks(self.chunk_size)
            .enumerate()
            .map(|(i, part)| Chunk::new(i as u64, part.to_vec()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    /// Number of chunks a stream of `total_size` bytes splits into.
    pub fn chunk_count(&self, total_size: u64) -> u64 {
        let size = self.chunk_size as u64;
        total_size / size + u64::from(total_size % size != 0)
    }

    /// Byte range `[start, end)` occupied by chunk `index` in a stream of
    /// `total_size` bytes.
    pub fn chunk_bounds(&self, index: u64, total_size: u64) -> Result<Range<u64>, ChunkError> {
        let count = self.chunk_count(total_size);
        if index >= count {
            return Err(ChunkError::IndexOutOfRange { index, count });
        }
        let start = index * self.chunk_size as u64;
        let end = start.saturating_add(self.chunk_size as u64).min(total_size);
        Ok(start..end)
    }

    // -----------------------------------------------------------------------
    // Verification & merging
    // -----------------------------------------------------------------------

    /// `true` if the chunk's data matches its checksum and cached size.
    pub fn verify(&self, chunk: &Chunk) -> bool {
        let ok = chunk.size_matches() && chunk.verify();
        if !ok {
            warn!(index = chunk.index, "chunk failed integrity check");
        }
        ok
    }

    /// Merge a chunk set, in any arrival order, into a reader over the
    /// original stream.
    pub fn merge(&self, chunks: &[Chunk]) -> Result<Cursor<Vec<u8>>, ChunkError> {
        self.merge_to_vec(chunks).map(Cursor::new)
    }

    /// Merge a chunk set into a contiguous buffer.
    pub fn merge_to_vec(&self, chunks: &[Chunk]) -> Result<Vec<u8>, ChunkError> {
        let ordered = self.ordered(chunks)?;
        let data = concat(&ordered);
        debug!(chunks = ordered.len(), bytes = data.len(), "merged chunks");
        Ok(data)
    }

    /// Build the manifest describing a complete chunk set.
    pub fn manifest(&self, chunks: &[Chunk]) -> Result<ChunkManifest, ChunkError> {
        let ordered = self.ordered(chunks)?;
        Ok(ChunkManifest::from_ordered(self.chunk_size, &ordered))
    }

    /// Merge a chunk set and check it against `manifest`: every expected
    /// chunk must be present and intact, and the result must hash to the
    /// manifest's file checksum.
    pub fn merge_with_manifest(
        &self,
        chunks: &[Chunk],
        manifest: &ChunkManifest,
    ) -> Result<Vec<u8>, ChunkError> {
        let ordered = self.ordered(chunks)?;

        let have = ordered.len() as u64;
        match have.cmp(&manifest.chunk_count()) {
            Ordering::Less => return Err(ChunkError::MissingChunk { index: have }),
            Ordering::Greater => {
                return Err(ChunkError::ManifestMismatch(format!(
                    "expected {} chunks, got {}",
                    manifest.chunk_count(),
                    have
                )))
            }
            Ordering::Equal => {}
        }
        for chunk in &ordered {
            manifest.check_chunk(chunk)?;
        }

        let data = concat(&ordered);
        let digest = hex::encode(Sha256::digest(&data));
        if data.len() as u64 != manifest.total_size || digest != manifest.checksum {
            warn!(
                expected = %manifest.checksum,
                actual = %digest,
                "reassembled file does not match manifest"
            );
            return Err(ChunkError::ManifestMismatch(
                "reassembled file checksum differs from manifest".into(),
            ));
        }

        info!(chunks = have, bytes = data.len(), "merged and verified upload");
        Ok(data)
    }

    /// Sort references to `chunks` by index and check that the set is dense,
    /// duplicate-free, and intact.
    fn ordered<'a>(&self, chunks: &'a [Chunk]) -> Result<Vec<&'a Chunk>, ChunkError> {
        let mut sorted: Vec<&Chunk> = chunks.iter().collect();
        sorted.sort_by_key(|chunk| chunk.index);

        for (expected, chunk) in sorted.iter().enumerate() {
            let expected = expected as u64;
            match chunk.index.cmp(&expected) {
                Ordering::Less => {
                    warn!(index = chunk.index, "duplicate chunk index");
                    return Err(ChunkError::DuplicateChunk { index: chunk.index });
                }
                Ordering::Greater => {
                    warn!(index = expected, "missing chunk index");
                    return Err(ChunkError::MissingChunk { index: expected });
                }
                Ordering::Equal => {}
            }
        }

        for chunk in &sorted {
            if !chunk.size_matches() {
                return Err(ChunkError::SizeMismatch {
                    index: chunk.index,
                    declared: chunk.size,
                    actual: chunk.data.len() as u64,
                });
            }
            if self.verify_on_merge && !chunk.verify() {
                warn!(index = chunk.index, "checksum mismatch during merge");
                return Err(ChunkError::ChecksumMismatch { index: chunk.index });
            }
        }

        Ok(sorted)
    }
}

fn concat(ordered: &[&Chunk]) -> Vec<u8> {
    let total = ordered.iter().map(|c| c.data.len()).sum();
    let mut data = Vec::with_capacity(total);
    for chunk in ordered {
        data.extend_from_slice(&chunk.data);
    }
    data
}

/// Read up to `limit` bytes, stopping early only at end of stream.
///
/// The buffer grows with the bytes actually read, never with `limit`.
fn read_chunk<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
