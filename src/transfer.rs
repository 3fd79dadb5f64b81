use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::HttpClient;

/// Suffix of files that are still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Scratch location next to `path` that is renamed onto it once complete
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Number of bytes written to disk
    pub bytes: u64,
    /// Hex encoded SHA-256 of the body, prefixed with `sha256:`
    pub content_hash: String,
}

/// Stream the body of `url` into a file at `destination`
///
/// The destination is created (or truncated) once the server answered with a
/// non-error status. `on_progress` receives the running byte count and the
/// announced content length after every chunk. A failed transfer may leave a
/// partially written destination behind; callers that care write to a
/// scratch path and rename.
pub async fn fetch_to_path<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    destination: &Path,
    mut on_progress: impl FnMut(u64, Option<u64>),
) -> Result<TransferResult, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut file =
        File::create(destination)
            .await
            .map_err(|e| DownloadError::FileCreateFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

        hasher.update(&chunk);
        bytes += chunk.len() as u64;
        on_progress(bytes, response.content_length);
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: destination.to_path_buf(),
            source: e,
        })?;

    Ok(TransferResult {
        bytes,
        content_hash: format_hash(&hasher.finalize()),
    })
}

fn format_hash(digest: &[u8]) -> String {
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
