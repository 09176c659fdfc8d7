//! Content fingerprinting for cache and change-detection keys
//!
//! Produces fixed-width lowercase hex SHA-256 digests for arbitrary text
//! and for file content streamed in fixed-size chunks. The digests are used
//! as metadata-cache request keys and as the processed-cache source
//! fingerprint, so they must be stable across runs.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file unreadable: {0}")]
    Unreadable(String),
}

/// SHA-256 hex digest of a UTF-8 string.
pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex_string(&hasher.finalize())
}

/// SHA-256 hex digest of raw bytes.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_string(&hasher.finalize())
}

/// SHA-256 hex digest of file content, streamed in 64 KiB chunks so large
/// video files never land in memory whole.
pub async fn digest_file(path: &Path) -> Result<String, FingerprintError> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| map_io_error(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| map_io_error(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex_string(&hasher.finalize()))
}

fn map_io_error(path: &Path, err: io::Error) -> FingerprintError {
    let display = path.display().to_string();
    match err.kind() {
        io::ErrorKind::NotFound => FingerprintError::NotFound(display),
        _ => FingerprintError::Unreadable(format!("{display}: {err}")),
    }
}

fn hex_string(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn text_digest_is_stable_hex() {
        let digest = digest_text("hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest_text("hello"));
        assert_ne!(digest, digest_text("hello "));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn file_digest_matches_text_digest_of_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mkv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not really video").unwrap();
        drop(file);

        let from_file = digest_file(&path).await.unwrap();
        assert_eq!(from_file, digest_text("not really video"));
    }

    #[tokio::test]
    async fn missing_file_surfaces_not_found() {
        let err = digest_file(Path::new("/definitely/not/here.mkv")).await.unwrap_err();
        assert!(matches!(err, FingerprintError::NotFound(_)));
    }
}
