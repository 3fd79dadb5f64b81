use std::path::Path;
use std::time::Duration;

use crate::error::{DownloadError, StateError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::state::ensure_dir;
use crate::transfer::{PARTIAL_SUFFIX, fetch_to_path, partial_path};

/// Position of a download within the current run, for progress output
#[derive(Debug, Clone, Copy)]
pub struct DownloadContext {
    /// Index of this entry among the kept entries
    pub entry_index: usize,
    pub total_entries: usize,
}

/// What `ensure` did for an enclosure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The file was fetched and is now in place
    Downloaded { bytes: u64, content_hash: String },
    /// The file already existed; nothing was fetched
    Skipped,
}

/// Local store of enclosure files, keyed by their path on disk
///
/// A file's existence is the only thing checked: once present it is never
/// fetched again. Transfers land in `<name>.partial` and are renamed when
/// complete, so an interrupted transfer never looks like a cached file.
pub struct EnclosureCache<C> {
    client: C,
    pacing_delay: Duration,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> EnclosureCache<C> {
    pub fn new(client: C, pacing_delay: Duration, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            pacing_delay,
            reporter,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create `dir` if needed and remove partial files left by an interrupted run
    ///
    /// Returns the number of partial files removed.
    pub fn prepare_dir(&self, dir: &Path) -> Result<usize, StateError> {
        ensure_dir(dir)?;

        let entries = std::fs::read_dir(dir).map_err(|e| StateError::ReadDirectoryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StateError::ReadDirectoryFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;

            let path = entry.path();
            let is_partial = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX));

            if is_partial && path.is_file() && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Make sure the enclosure at `remote_url` is present at `local_path`
    pub async fn ensure(
        &self,
        remote_url: &str,
        local_path: &Path,
        context: DownloadContext,
    ) -> Result<CacheOutcome, DownloadError> {
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if local_path.exists() {
            self.reporter
                .report(ProgressEvent::EnclosureSkipped { filename });
            return Ok(CacheOutcome::Skipped);
        }

        self.reporter.report(ProgressEvent::DownloadStarting {
            filename: filename.clone(),
            entry_index: context.entry_index,
            total_entries: context.total_entries,
        });

        let partial = partial_path(local_path);
        let result = fetch_to_path(&self.client, remote_url, &partial, |bytes, total| {
            self.reporter.report(ProgressEvent::DownloadProgress {
                filename: filename.clone(),
                bytes_downloaded: bytes,
                total_bytes: total,
            });
        })
        .await
        .and_then(|transfer| {
            std::fs::rename(&partial, local_path)
                .map(|()| transfer)
                .map_err(|e| DownloadError::FinalizeFailed {
                    from: partial.clone(),
                    to: local_path.to_path_buf(),
                    source: e,
                })
        });

        let transfer = match result {
            Ok(transfer) => transfer,
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                self.reporter.report(ProgressEvent::DownloadFailed {
                    filename,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.reporter.report(ProgressEvent::DownloadCompleted {
            filename,
            bytes_downloaded: transfer.bytes,
            content_hash: transfer.content_hash.clone(),
        });

        if !self.pacing_delay.is_zero() {
            tokio::time::sleep(self.pacing_delay).await;
        }

        Ok(CacheOutcome::Downloaded {
            bytes: transfer.bytes,
            content_hash: transfer.content_hash,
        })
    }
}
