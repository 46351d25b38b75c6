//! A single fixed-size slice of an uploaded stream.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `data`.
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One contiguous slice of a larger byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position of this chunk in the original stream.
    pub index: u64,
    /// Raw bytes of the slice.
    pub data: Vec<u8>,
    /// SHA-256 of `data`, hex-encoded, taken at creation time.
    pub checksum: String,
    /// Byte length of `data`.
    pub size: u64,
}

impl Chunk {
    /// Create a chunk, computing its checksum and size from `data`.
    pub fn new(index: u64, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            index,
            checksum: checksum(&data),
            size: data.len() as u64,
            data,
        }
    }

    /// `true` if `data` still hashes to the recorded checksum.
    pub fn verify(&self) -> bool {
        checksum(&self.data) == self.checksum
    }

    /// `true` if the cached size agrees with `data`.
    pub fn size_matches(&self) -> bool {
        self.size == self.data.len() as u64
    }
}
