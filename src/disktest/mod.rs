//! Disk Integrity Tester
//!
//! Writes a deterministic payload through the filesystem of a mounted target
//! drive, reads it back, and compares streaming checksums. A mismatch is a
//! result, not an exception: it is the hardware defect this harness exists
//! to surface. The test artifact is removed on every path out of the test,
//! including mid-test I/O errors, via a drop guard.

use crate::checksum::{checksum_file_with_buffer, ChecksumAlgorithm, ChecksumResult, StreamingHasher};
use crate::error::{IoResultExt, Result, ServerCheckError};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Chunk size for streamed payload generation and read-back
const CHUNK_SIZE: usize = 1024 * 1024;

/// Per-device outcome of one write/read/verify pass
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityTestResult {
    /// Mount path the payload was written under
    pub mount_path: PathBuf,
    /// Bytes written to the device
    pub bytes_written: u64,
    /// Checksum computed while generating the payload
    pub write_checksum: ChecksumResult,
    /// Checksum computed over the bytes read back
    pub read_checksum: ChecksumResult,
    /// Whether the two checksums agree
    pub matched: bool,
    /// Wall-clock time for the whole pass
    pub elapsed: Duration,
    /// Whether the explicit artifact removal succeeded
    pub cleanup_succeeded: bool,
}

/// Removes the test artifact on every exit path.
///
/// The explicit [`ArtifactGuard::remove`] call reports success into the
/// result; if an error propagates first, `Drop` still deletes the file.
struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Remove the artifact now and report whether the path is gone
    fn remove(mut self) -> bool {
        self.armed = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            // Never created counts as cleaned up
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "artifact cleanup failed");
                false
            }
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "artifact cleanup failed on error path"
                    );
                }
            }
        }
    }
}

/// Fill a chunk with a deterministic pattern derived from its index.
///
/// xorshift64 keeps the payload incompressible enough that controller-level
/// deduplication cannot fake a successful read-back.
fn fill_chunk(buffer: &mut [u8], chunk_index: u64) {
    let mut state = chunk_index.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    for word in buffer.chunks_mut(8) {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let bytes = state.to_le_bytes();
        word.copy_from_slice(&bytes[..word.len()]);
    }
}

/// Generate and write `size_mb` MiB to `path`, returning the write-side
/// checksum computed incrementally during generation.
fn write_payload(path: &Path, size_mb: u64, algorithm: ChecksumAlgorithm) -> Result<ChecksumResult> {
    let file = File::create(path).with_path(path)?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    for chunk_index in 0..size_mb {
        fill_chunk(&mut buffer, chunk_index);
        hasher.process(&buffer);
        writer.write_all(&buffer).with_path(path)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| ServerCheckError::io(path, e.into_error()))?;
    // Force the payload to durable storage before the read-back pass
    file.sync_all().with_path(path)?;
    Ok(hasher.finalize())
}

/// Run one write/read/verify pass against a mounted filesystem.
///
/// Callers must only invoke this for devices in the mounted state; a missing
/// or non-directory `mount_path` is a precondition failure, not an I/O error.
pub fn test_device(
    mount_path: &Path,
    size_mb: u64,
    algorithm: ChecksumAlgorithm,
) -> Result<IntegrityTestResult> {
    if !mount_path.is_dir() {
        return Err(ServerCheckError::Precondition(format!(
            "test_device called for '{}', which is not a mounted directory",
            mount_path.display()
        )));
    }

    let artifact = mount_path.join(format!(".servercheck_write_test_{}", std::process::id()));
    let guard = ArtifactGuard::new(artifact.clone());
    let start = Instant::now();

    let write_checksum = write_payload(&artifact, size_mb, algorithm)?;
    let read_checksum = checksum_file_with_buffer(&artifact, algorithm, CHUNK_SIZE)?;
    let matched = write_checksum.matches(&read_checksum);
    if !matched {
        tracing::warn!(
            path = %artifact.display(),
            wrote = %write_checksum,
            read = %read_checksum,
            "checksum mismatch on read-back"
        );
    }

    let cleanup_succeeded = guard.remove();
    Ok(IntegrityTestResult {
        mount_path: mount_path.to_path_buf(),
        bytes_written: size_mb * CHUNK_SIZE as u64,
        write_checksum,
        read_checksum,
        matched,
        elapsed: start.elapsed(),
        cleanup_succeeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact_in(dir: &Path) -> PathBuf {
        dir.join(format!(".servercheck_write_test_{}", std::process::id()))
    }

    #[test]
    fn test_round_trip_passes_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let result = test_device(dir.path(), 2, ChecksumAlgorithm::Crc32c).unwrap();
        assert!(result.matched);
        assert!(result.cleanup_succeeded);
        assert_eq!(result.bytes_written, 2 * 1024 * 1024);
        assert_eq!(result.write_checksum.bytes, result.read_checksum.bytes);
        assert!(!artifact_in(dir.path()).exists());
    }

    #[test]
    fn test_missing_mount_path_is_precondition_failure() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("never-mounted");
        let err = test_device(&missing, 1, ChecksumAlgorithm::Crc32c).unwrap_err();
        assert!(matches!(err, ServerCheckError::Precondition(_)));
    }

    #[test]
    fn test_payload_is_deterministic_per_chunk() {
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        fill_chunk(&mut a, 7);
        fill_chunk(&mut b, 7);
        assert_eq!(a, b);
        fill_chunk(&mut b, 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupted_read_back_is_fail_not_error() {
        // Drive the two halves of the pass directly so a corrupted byte can
        // be injected between write and read-back.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload");
        let wrote = write_payload(&path, 1, ChecksumAlgorithm::Crc32c).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        data[512 * 1024] ^= 0x01;
        std::fs::write(&path, &data).unwrap();

        let read = checksum_file_with_buffer(&path, ChecksumAlgorithm::Crc32c, CHUNK_SIZE).unwrap();
        assert!(!wrote.matches(&read));
    }

    #[test]
    fn test_guard_removes_artifact_when_dropped_on_error_path() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join(".probe");
        std::fs::write(&artifact, b"partial payload").unwrap();
        {
            let _guard = ArtifactGuard::new(artifact.clone());
            // Simulates an error propagating before the explicit removal
        }
        assert!(!artifact.exists());
    }

    #[test]
    fn test_explicit_remove_reports_success() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join(".probe");
        std::fs::write(&artifact, b"payload").unwrap();
        let guard = ArtifactGuard::new(artifact.clone());
        assert!(guard.remove());
        assert!(!artifact.exists());

        // Removing an artifact that never materialized still counts
        let guard = ArtifactGuard::new(dir.path().join(".never-written"));
        assert!(guard.remove());
    }

    #[test]
    fn test_write_checksum_counts_all_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload");
        let wrote = write_payload(&path, 3, ChecksumAlgorithm::Xxh64).unwrap();
        assert_eq!(wrote.bytes, 3 * 1024 * 1024);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * 1024 * 1024);
    }
}
