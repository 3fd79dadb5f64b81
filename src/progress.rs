use std::sync::Arc;

/// Why an entry was left out of the mirrored feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Test mode already processed its share of entries
    TestLimit,
    /// Published longer ago than the configured maximum
    TooOld { age_days: i64 },
    /// The enclosure could not be downloaded and the run skips failures
    DownloadFailed,
}

/// Events emitted during a mirror run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A run for this feed is starting
    MirrorStarting { feed_source: String },

    /// The previous run was too recent; nothing else will happen
    GateClosed {
        elapsed_secs: i64,
        threshold_secs: i64,
    },

    /// Stale `.partial` files from an interrupted run were removed
    PartialFilesCleanedUp { count: usize },

    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed has been parsed and classified
    FeedPlanned {
        feed_title: String,
        total_entries: usize,
        kept_entries: usize,
    },

    /// An entry will not appear in the mirrored feed
    EntryDropped { filename: String, reason: DropReason },

    /// The enclosure is already present locally
    EnclosureSkipped { filename: String },

    /// An enclosure download is starting
    DownloadStarting {
        filename: String,
        /// Index of this entry among the kept entries
        entry_index: usize,
        total_entries: usize,
    },

    /// Download progress update
    DownloadProgress {
        filename: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An enclosure download completed successfully
    DownloadCompleted {
        filename: String,
        bytes_downloaded: u64,
        content_hash: String,
    },

    /// An enclosure download failed
    DownloadFailed { filename: String, error: String },

    /// The pruned feed document has been written
    DocumentWritten { path: String, entries: usize },

    /// Mirror run completed
    MirrorCompleted {
        feed_source: String,
        downloaded_count: usize,
        skipped_count: usize,
        dropped_count: usize,
    },

    /// Mirror run failed; no state was committed
    MirrorFailed { error: String },
}

impl ProgressEvent {
    /// Whether this event ends the run
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::GateClosed { .. } | Self::MirrorCompleted { .. } | Self::MirrorFailed { .. }
        )
    }
}

/// Trait for reporting progress events during a mirror run.
///
/// Implementations can use this to display progress bars, write log lines,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Forwards every event to each of its reporters, in order
#[derive(Clone, Default)]
pub struct FanoutReporter {
    reporters: Vec<SharedProgressReporter>,
}

impl FanoutReporter {
    pub fn new(reporters: Vec<SharedProgressReporter>) -> Self {
        Self { reporters }
    }

    pub fn shared(reporters: Vec<SharedProgressReporter>) -> SharedProgressReporter {
        Arc::new(Self::new(reporters))
    }
}

impl ProgressReporter for FanoutReporter {
    fn report(&self, event: ProgressEvent) {
        for reporter in &self.reporters {
            reporter.report(event.clone());
        }
    }
}
