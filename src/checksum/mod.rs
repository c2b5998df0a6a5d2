//! Streaming checksums for the disk integrity test
//!
//! CRC32C is the default algorithm (the same verification family the disk
//! write test has always used); XXH64 and SHA-256 are selectable alternates.
//! All hashers support incremental updates so the write-side digest is
//! computed during payload generation, without a second full pass.

use crate::error::{IoResultExt, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Checksum algorithm for integrity verification
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// CRC32C - hardware-accelerated cyclic redundancy check
    #[default]
    #[value(name = "crc32c")]
    Crc32c,
    /// XXH64 - fast, non-cryptographic (64-bit)
    #[value(name = "xxh64")]
    Xxh64,
    /// SHA-256 - standard cryptographic hash
    #[value(name = "sha256")]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Crc32c => "CRC32C",
            Self::Xxh64 => "XXH64",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Checksum result as hex string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumResult {
    /// The algorithm used
    pub algorithm: ChecksumAlgorithm,
    /// Digest as lowercase hex string
    pub digest: String,
    /// Number of bytes hashed
    pub bytes: u64,
}

impl ChecksumResult {
    /// Compare against another result (same algorithm, same digest)
    pub fn matches(&self, other: &ChecksumResult) -> bool {
        self.algorithm == other.algorithm && self.digest == other.digest
    }
}

impl std::fmt::Display for ChecksumResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// Unified hasher over all supported algorithms
pub enum Hasher {
    /// CRC32C running state
    Crc32c(u32),
    /// XXH64
    Xxh64(xxhash_rust::xxh64::Xxh64),
    /// SHA-256
    Sha256(sha2::Sha256),
}

impl Hasher {
    /// Create a new hasher for the given algorithm
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Crc32c => Self::Crc32c(0),
            ChecksumAlgorithm::Xxh64 => Self::Xxh64(xxhash_rust::xxh64::Xxh64::new(0)),
            ChecksumAlgorithm::Sha256 => {
                use sha2::Digest;
                Self::Sha256(sha2::Sha256::new())
            }
        }
    }

    /// Get the algorithm this hasher uses
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Self::Crc32c(_) => ChecksumAlgorithm::Crc32c,
            Self::Xxh64(_) => ChecksumAlgorithm::Xxh64,
            Self::Sha256(_) => ChecksumAlgorithm::Sha256,
        }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32c(state) => *state = crc32c::crc32c_append(*state, data),
            Self::Xxh64(h) => h.update(data),
            Self::Sha256(h) => {
                use sha2::Digest;
                h.update(data);
            }
        }
    }

    /// Finalize and get the digest as hex string
    pub fn finalize(self) -> String {
        match self {
            Self::Crc32c(state) => format!("{:08x}", state),
            Self::Xxh64(h) => format!("{:016x}", h.digest()),
            Self::Sha256(h) => {
                use sha2::Digest;
                hex::encode(h.finalize())
            }
        }
    }
}

/// Streaming hasher that tracks bytes processed
pub struct StreamingHasher {
    hasher: Hasher,
    bytes_processed: u64,
}

impl StreamingHasher {
    /// Create a new streaming hasher
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            hasher: Hasher::new(algorithm),
            bytes_processed: 0,
        }
    }

    /// Process a chunk of data
    pub fn process(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes_processed += data.len() as u64;
    }

    /// Get bytes processed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    /// Finalize and get the result
    pub fn finalize(self) -> ChecksumResult {
        let algorithm = self.hasher.algorithm();
        ChecksumResult {
            algorithm,
            digest: self.hasher.finalize(),
            bytes: self.bytes_processed,
        }
    }
}

/// Compute the checksum of a file with streamed reads
pub fn checksum_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumResult> {
    checksum_file_with_buffer(path, algorithm, 1024 * 1024) // 1MB buffer
}

/// Compute the checksum of a file with a custom buffer size
pub fn checksum_file_with_buffer(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    buffer_size: usize,
) -> Result<ChecksumResult> {
    let file = File::open(path).with_path(path)?;
    let mut reader = BufReader::with_capacity(buffer_size, file);
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let bytes_read = reader.read(&mut buffer).with_path(path)?;
        if bytes_read == 0 {
            break;
        }
        hasher.process(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute the checksum of data in memory
pub fn checksum_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumResult {
    let mut hasher = StreamingHasher::new(algorithm);
    hasher.process(data);
    hasher.finalize()
}
