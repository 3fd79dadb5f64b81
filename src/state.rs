use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::MirrorLayout;
use crate::error::StateError;

/// Minimum time between two runs of the same feed: a little less than a
/// day, so a daily schedule that fires slightly early still runs
pub const GATE_THRESHOLD_SECS: i64 = 24 * 60 * 60 - 100;

/// Why a run is allowed to proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    NoPriorRun,
    ThresholdElapsed,
    TestMode,
    Forced,
}

/// Result of the rate gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Open(GateReason),
    Closed { elapsed_secs: i64 },
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

/// Persistence of the last completed run per feed identity
///
/// `commit` must replace the stored value atomically: a reader sees either
/// the previous timestamp or the new one.
pub trait MirrorStateStore: Send + Sync {
    /// Start time of the last completed run, if any is known
    fn last_run(&self, feed_id: &str) -> Result<Option<DateTime<Utc>>, StateError>;

    /// Record `started_at` as the start of the last completed run
    fn commit(&self, feed_id: &str, started_at: DateTime<Utc>) -> Result<(), StateError>;

    /// Decide whether a run starting at `now` may proceed
    fn should_run(
        &self,
        feed_id: &str,
        now: DateTime<Utc>,
        test_mode: bool,
        force: bool,
    ) -> Result<GateDecision, StateError> {
        let Some(last) = self.last_run(feed_id)? else {
            return Ok(GateDecision::Open(GateReason::NoPriorRun));
        };

        let elapsed_secs = (now - last).num_seconds();
        let decision = if elapsed_secs >= GATE_THRESHOLD_SECS {
            GateDecision::Open(GateReason::ThresholdElapsed)
        } else if test_mode {
            GateDecision::Open(GateReason::TestMode)
        } else if force {
            GateDecision::Open(GateReason::Forced)
        } else {
            GateDecision::Closed { elapsed_secs }
        };

        Ok(decision)
    }
}

/// Stores the timestamp as decimal text in `<root>/<feed_id>/last_download.log`
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn layout(&self, feed_id: &str) -> MirrorLayout {
        MirrorLayout::new(&self.root_dir, feed_id)
    }
}

impl MirrorStateStore for FileStateStore {
    fn last_run(&self, feed_id: &str) -> Result<Option<DateTime<Utc>>, StateError> {
        let path = self.layout(feed_id).state_path;

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::ReadFailed { path, source: e }),
        };

        // Unreadable content counts as "never ran"
        Ok(parse_timestamp(&content))
    }

    fn commit(&self, feed_id: &str, started_at: DateTime<Utc>) -> Result<(), StateError> {
        let layout = self.layout(feed_id);
        ensure_dir(&layout.feed_dir)?;

        let tmp_path = layout.state_path.with_extension("log.tmp");
        std::fs::write(&tmp_path, started_at.timestamp().to_string()).map_err(|e| {
            StateError::WriteFailed {
                path: tmp_path.clone(),
                source: e,
            }
        })?;

        std::fs::rename(&tmp_path, &layout.state_path).map_err(|e| StateError::WriteFailed {
            path: layout.state_path.clone(),
            source: e,
        })
    }
}

fn parse_timestamp(content: &str) -> Option<DateTime<Utc>> {
    content
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Create `dir` and its parents if they do not exist yet
pub fn ensure_dir(dir: &Path) -> Result<(), StateError> {
    std::fs::create_dir_all(dir).map_err(|e| StateError::CreateDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Keeps state in memory; nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    runs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a previous run
    pub fn with_last_run(self, feed_id: &str, started_at: DateTime<Utc>) -> Self {
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(feed_id.to_string(), started_at);
        }
        self
    }
}

impl MirrorStateStore for MemoryStateStore {
    fn last_run(&self, feed_id: &str) -> Result<Option<DateTime<Utc>>, StateError> {
        Ok(self
            .runs
            .lock()
            .ok()
            .and_then(|runs| runs.get(feed_id).copied()))
    }

    fn commit(&self, feed_id: &str, started_at: DateTime<Utc>) -> Result<(), StateError> {
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(feed_id.to_string(), started_at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn gate_opens_without_prior_run() {
        let store = MemoryStateStore::new();
        let decision = store.should_run("show", noon(), false, false).unwrap();
        assert_eq!(decision, GateDecision::Open(GateReason::NoPriorRun));
    }

    #[test]
    fn gate_closes_within_threshold() {
        let store = MemoryStateStore::new().with_last_run("show", noon());
        let now = noon() + Duration::seconds(GATE_THRESHOLD_SECS - 1);

        let decision = store.should_run("show", now, false, false).unwrap();
        assert_eq!(
            decision,
            GateDecision::Closed {
                elapsed_secs: GATE_THRESHOLD_SECS - 1
            }
        );
    }

    #[test]
    fn gate_opens_exactly_at_threshold() {
        let store = MemoryStateStore::new().with_last_run("show", noon());
        let now = noon() + Duration::seconds(GATE_THRESHOLD_SECS);

        let decision = store.should_run("show", now, false, false).unwrap();
        assert_eq!(decision, GateDecision::Open(GateReason::ThresholdElapsed));
    }

    #[test]
    fn threshold_is_slightly_below_a_day() {
        assert!(GATE_THRESHOLD_SECS < 24 * 60 * 60);
        assert!(GATE_THRESHOLD_SECS > 23 * 60 * 60);
    }

    #[test]
    fn test_mode_and_force_bypass_the_gate() {
        let store = MemoryStateStore::new().with_last_run("show", noon());
        let now = noon() + Duration::minutes(5);

        assert_eq!(
            store.should_run("show", now, true, false).unwrap(),
            GateDecision::Open(GateReason::TestMode)
        );
        assert_eq!(
            store.should_run("show", now, false, true).unwrap(),
            GateDecision::Open(GateReason::Forced)
        );
    }

    #[test]
    fn gate_is_scoped_per_feed() {
        let store = MemoryStateStore::new().with_last_run("show", noon());
        let decision = store.should_run("other", noon(), false, false).unwrap();
        assert!(decision.is_open());
    }

    #[test]
    fn file_store_round_trips_start_time() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path());

        store.commit("show", noon()).unwrap();

        assert_eq!(store.last_run("show").unwrap(), Some(noon()));
        let raw = std::fs::read_to_string(dir.path().join("show/last_download.log")).unwrap();
        assert_eq!(raw, noon().timestamp().to_string());
    }

    #[test]
    fn file_store_commit_creates_feed_dir() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested"));

        store.commit("show", noon()).unwrap();

        assert!(dir.path().join("nested/show").is_dir());
        assert!(!dir.path().join("nested/show/last_download.log.tmp").exists());
    }

    #[test]
    fn file_store_without_file_has_no_prior_run() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        assert_eq!(store.last_run("show").unwrap(), None);
    }

    #[test]
    fn corrupt_state_counts_as_no_prior_run() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("show")).unwrap();

        for garbage in ["", "yesterday", "12.5", "\n"] {
            std::fs::write(dir.path().join("show/last_download.log"), garbage).unwrap();
            let store = FileStateStore::new(dir.path());

            assert_eq!(store.last_run("show").unwrap(), None, "{garbage:?}");
            assert_eq!(
                store.should_run("show", noon(), false, false).unwrap(),
                GateDecision::Open(GateReason::NoPriorRun)
            );
        }
    }

    #[test]
    fn file_store_accepts_trailing_newline() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("show")).unwrap();
        std::fs::write(
            dir.path().join("show/last_download.log"),
            format!("{}\n", noon().timestamp()),
        )
        .unwrap();

        let store = FileStateStore::new(dir.path());
        assert_eq!(store.last_run("show").unwrap(), Some(noon()));
    }
}
