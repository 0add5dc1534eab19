//! BLAKE3 artifact digests

use pkgd_errors::{Error, NetworkError};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hex BLAKE3 digest of a file
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn file_digest(path: &Path) -> Result<String, Error> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Check a file against an expected hex digest
///
/// # Errors
///
/// Returns `NetworkError::ChecksumMismatch` when the digests differ, or an I/O
/// error if the file cannot be read.
pub async fn verify_file(path: &Path, expected: &str) -> Result<(), Error> {
    let actual = file_digest(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(NetworkError::ChecksumMismatch {
            url: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into())
    }
}
