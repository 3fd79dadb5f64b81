use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;

use crate::clock::SharedClock;
use crate::progress::{DropReason, ProgressEvent, ProgressReporter};

struct LogState {
    writer: Option<BufWriter<File>>,
    test_limit_logged: bool,
}

/// Appends one timestamped line per event to the run log
///
/// Lines look like `2024-06-15 14:00:00 downloading ep42.mp3`. The final
/// event of a run is followed by an empty line and closes the file; events
/// arriving afterwards are dropped.
pub struct LogFileReporter {
    clock: SharedClock,
    state: Mutex<LogState>,
}

impl LogFileReporter {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path, clock: SharedClock) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            clock,
            state: Mutex::new(LogState {
                writer: Some(BufWriter::new(file)),
                test_limit_logged: false,
            }),
        })
    }

    /// Whether the final event has already closed the log
    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.writer.is_none())
            .unwrap_or(true)
    }
}

impl ProgressReporter for LogFileReporter {
    fn report(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        if matches!(
            event,
            ProgressEvent::EntryDropped {
                reason: DropReason::TestLimit,
                ..
            }
        ) {
            if state.test_limit_logged {
                return;
            }
            state.test_limit_logged = true;
        }

        let Some(message) = describe(&event) else {
            return;
        };
        let Some(writer) = state.writer.as_mut() else {
            return;
        };

        let timestamp = self
            .clock
            .now()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S");
        let eol = if event.is_final() { "\n\n" } else { "\n" };

        // Write failures are ignored, the run itself must not fail on them
        let _ = write!(writer, "{timestamp} {message}{eol}");
        let _ = writer.flush();

        if event.is_final() {
            state.writer = None;
        }
    }
}

/// Log line for an event, or `None` for events too chatty to log
fn describe(event: &ProgressEvent) -> Option<String> {
    let message = match event {
        ProgressEvent::MirrorStarting { feed_source } => format!("Start mirroring of {feed_source}"),
        ProgressEvent::GateClosed {
            elapsed_secs,
            threshold_secs,
        } => format!(
            "Download timeout has not been reached ({elapsed_secs}s of {threshold_secs}s)! Exiting"
        ),
        ProgressEvent::PartialFilesCleanedUp { count } => {
            format!("removed {count} partial file(s) from an interrupted run")
        }
        ProgressEvent::FetchingFeed { url } => format!("fetching {url}"),
        ProgressEvent::FeedPlanned {
            feed_title,
            total_entries,
            kept_entries,
        } => format!("{feed_title}: {kept_entries} of {total_entries} entries in scope"),
        ProgressEvent::EntryDropped { filename, reason } => match reason {
            DropReason::TestLimit => "Test mode, skipping remaining entries.".to_string(),
            DropReason::TooOld { age_days } => {
                format!("{filename} too old ({age_days} days). deleting from rss")
            }
            DropReason::DownloadFailed => {
                format!("{filename} could not be fetched. deleting from rss")
            }
        },
        ProgressEvent::EnclosureSkipped { filename } => {
            format!("skipping {filename}, already exists")
        }
        ProgressEvent::DownloadStarting { filename, .. } => format!("downloading {filename}"),
        ProgressEvent::DownloadProgress { .. } => return None,
        ProgressEvent::DownloadCompleted {
            filename,
            bytes_downloaded,
            content_hash,
        } => format!("downloaded {filename} ({bytes_downloaded} bytes, {content_hash})"),
        ProgressEvent::DownloadFailed { filename, error } => {
            format!("failed to download {filename}: {error}")
        }
        ProgressEvent::DocumentWritten { path, entries } => {
            format!("wrote {path} with {entries} entries")
        }
        ProgressEvent::MirrorCompleted { feed_source, .. } => {
            format!("Finished mirroring {feed_source}")
        }
        ProgressEvent::MirrorFailed { error } => format!("Mirroring failed: {error}"),
    };

    Some(message)
}
