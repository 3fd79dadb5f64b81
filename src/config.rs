use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::feed::is_url;

/// Default maximum age of mirrored entries, in days
pub const DEFAULT_MAX_AGE_DAYS: i64 = 365;

/// Number of entries processed when test mode is active
pub const TEST_MODE_ENTRY_LIMIT: usize = 10;

/// Default pause after every completed enclosure download
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_secs(1);

const LOG_FILENAME: &str = "podcast_mirror.log";
const STATE_FILENAME: &str = "last_download.log";

/// What to do when a single enclosure cannot be downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnclosureFailurePolicy {
    /// Fail the whole run; nothing is published and state stays untouched
    #[default]
    Abort,
    /// Leave the entry out of the published feed and carry on
    SkipEntry,
}

/// Everything a mirror run needs to know about one feed
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Upstream feed URL, or path to a local RSS file
    pub feed_source: String,
    /// Local name under which files and state of this feed are grouped
    pub feed_id: String,
    /// Public base URL the mirrored files are served from
    pub new_base_href: String,
    /// Directory holding the feed directories and the run log
    pub root_dir: PathBuf,
    /// Entries older than this many days are left out
    pub max_age_days: i64,
    /// Process at most [`TEST_MODE_ENTRY_LIMIT`] entries and ignore the gate
    pub test_mode: bool,
    /// Run even if the previous run was less than a day ago
    pub force: bool,
    /// Keep entries regardless of their age
    pub include_all: bool,
    /// Pause after every downloaded enclosure
    pub pacing_delay: Duration,
    pub failure_policy: EnclosureFailurePolicy,
}

impl MirrorConfig {
    /// Create a config with default limits for the given feed
    pub fn new(
        feed_source: impl Into<String>,
        feed_id: impl Into<String>,
        new_base_href: impl Into<String>,
        root_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            feed_source: feed_source.into(),
            feed_id: feed_id.into(),
            new_base_href: new_base_href.into(),
            root_dir: root_dir.into(),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            test_mode: false,
            force: false,
            include_all: false,
            pacing_delay: DEFAULT_PACING_DELAY,
            failure_policy: EnclosureFailurePolicy::default(),
        }
    }

    /// Check the values that would otherwise only fail halfway through a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut components = Path::new(&self.feed_id).components();
        let single_normal_component = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if self.feed_id.is_empty() || !single_normal_component {
            return Err(ConfigError::InvalidFeedId(self.feed_id.clone()));
        }

        Url::parse(&self.new_base_href).map_err(|e| ConfigError::InvalidBaseHref {
            href: self.new_base_href.clone(),
            source: e,
        })?;

        if !is_url(&self.feed_source) && !Path::new(&self.feed_source).is_file() {
            return Err(ConfigError::InvalidFeedSource(self.feed_source.clone()));
        }

        Ok(())
    }

    pub fn layout(&self) -> MirrorLayout {
        MirrorLayout::new(&self.root_dir, &self.feed_id)
    }
}

/// On-disk locations used by a mirror run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    pub root_dir: PathBuf,
    /// `<root>/<feed_id>`: media files, output document, state file
    pub feed_dir: PathBuf,
    /// `<root>/<feed_id>/<feed_id>.rss`
    pub document_path: PathBuf,
    pub state_path: PathBuf,
    /// Scratch file the upstream document is downloaded to
    pub transient_path: PathBuf,
    pub log_path: PathBuf,
}

impl MirrorLayout {
    pub fn new(root_dir: &Path, feed_id: &str) -> Self {
        let feed_dir = root_dir.join(feed_id);

        Self {
            root_dir: root_dir.to_path_buf(),
            document_path: feed_dir.join(format!("{feed_id}.rss")),
            state_path: feed_dir.join(STATE_FILENAME),
            transient_path: root_dir.join(format!("{feed_id}_rss.tmp")),
            log_path: root_dir.join(LOG_FILENAME),
            feed_dir,
        }
    }

    /// Location of a mirrored media file
    pub fn media_path(&self, filename: &str) -> PathBuf {
        self.feed_dir.join(filename)
    }
}
