// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheOutcome, DownloadContext, EnclosureCache};
use crate::clock::SharedClock;
use crate::config::{EnclosureFailurePolicy, MirrorConfig, MirrorLayout};
use crate::error::{FeedError, MirrorError};
use crate::feed::{
    EntryDecision, apply_plan, fetch_document, is_url, parse_feed_file, plan_mirror,
    write_document,
};
use crate::http::HttpClient;
use crate::progress::{DropReason, ProgressEvent, SharedProgressReporter};
use crate::state::{GATE_THRESHOLD_SECS, GateDecision, MirrorStateStore};

/// An entry whose enclosure could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub filename: String,
    pub error: String,
}

/// Result of a completed mirror run
#[derive(Debug, Clone, Serialize)]
pub struct MirrorSummary {
    pub feed_id: String,
    pub started_at: DateTime<Utc>,
    /// Entries in the upstream document
    pub total_entries: usize,
    /// Entries in the published document
    pub published_entries: usize,
    /// Entries left out by age or test mode
    pub dropped: usize,
    pub downloaded: usize,
    /// Enclosures that were already present
    pub skipped: usize,
    /// Entries left out because their enclosure failed
    pub failed: Vec<FailedEntry>,
    pub document_path: PathBuf,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The previous run was too recent; nothing was done
    Gated { elapsed_secs: i64 },
    Completed(MirrorSummary),
}

/// Mirrors one feed: gate, fetch, filter, download, prune, persist
///
/// State is committed only after the pruned document has been written, so a
/// run that dies halfway leaves the previous state in place and the next
/// invocation simply starts over.
pub struct MirrorEngine<C, S> {
    config: MirrorConfig,
    layout: MirrorLayout,
    cache: EnclosureCache<C>,
    store: S,
    clock: SharedClock,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient, S: MirrorStateStore> MirrorEngine<C, S> {
    pub fn new(
        config: MirrorConfig,
        client: C,
        store: S,
        clock: SharedClock,
        reporter: SharedProgressReporter,
    ) -> Self {
        let layout = config.layout();
        let cache = EnclosureCache::new(client, config.pacing_delay, reporter.clone());

        Self {
            config,
            layout,
            cache,
            store,
            clock,
            reporter,
        }
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Perform one mirror run
    ///
    /// Every failure is reported as [`ProgressEvent::MirrorFailed`] before it
    /// is returned.
    pub async fn run(&self) -> Result<RunOutcome, MirrorError> {
        let started_at = self.clock.now();

        self.reporter.report(ProgressEvent::MirrorStarting {
            feed_source: self.config.feed_source.clone(),
        });

        match self.run_at(started_at).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.reporter.report(ProgressEvent::MirrorFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_at(&self, started_at: DateTime<Utc>) -> Result<RunOutcome, MirrorError> {
        self.config.validate()?;

        let gate = self.store.should_run(
            &self.config.feed_id,
            started_at,
            self.config.test_mode,
            self.config.force,
        )?;
        if let GateDecision::Closed { elapsed_secs } = gate {
            self.reporter.report(ProgressEvent::GateClosed {
                elapsed_secs,
                threshold_secs: GATE_THRESHOLD_SECS,
            });
            return Ok(RunOutcome::Gated { elapsed_secs });
        }

        let cleaned = self.cache.prepare_dir(&self.layout.feed_dir)?;
        if cleaned > 0 {
            self.reporter
                .report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
        }

        let mut channel = self.fetch_upstream().await?;
        let total_entries = channel.items().len();

        let plan = plan_mirror(channel.items(), &self.config, &self.layout, started_at)?;

        self.reporter.report(ProgressEvent::FeedPlanned {
            feed_title: channel.title().to_string(),
            total_entries,
            kept_entries: plan.kept_count(),
        });
        for decision in &plan.decisions {
            if let EntryDecision::Drop { label, reason, .. } = decision {
                self.reporter.report(ProgressEvent::EntryDropped {
                    filename: label.clone(),
                    reason: *reason,
                });
            }
        }

        let total_kept = plan.kept_count();
        let mut downloaded = 0;
        let mut skipped = 0;
        let mut failed = Vec::new();
        let mut excluded = HashSet::new();

        for (entry_index, kept) in plan.kept().enumerate() {
            let context = DownloadContext {
                entry_index,
                total_entries: total_kept,
            };

            match self
                .cache
                .ensure(&kept.original_url, &kept.local_path, context)
                .await
            {
                Ok(CacheOutcome::Downloaded { .. }) => downloaded += 1,
                Ok(CacheOutcome::Skipped) => skipped += 1,
                Err(e) => match self.config.failure_policy {
                    EnclosureFailurePolicy::Abort => {
                        return Err(MirrorError::Download {
                            filename: kept.filename.clone(),
                            source: e,
                        });
                    }
                    EnclosureFailurePolicy::SkipEntry => {
                        self.reporter.report(ProgressEvent::EntryDropped {
                            filename: kept.filename.clone(),
                            reason: DropReason::DownloadFailed,
                        });
                        excluded.insert(kept.position);
                        failed.push(FailedEntry {
                            filename: kept.filename.clone(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        let mirrored = apply_plan(channel.items(), &plan, &excluded);
        let published_entries = mirrored.len();
        channel.set_items(mirrored);

        write_document(&channel, &self.layout.document_path)?;
        self.reporter.report(ProgressEvent::DocumentWritten {
            path: self.layout.document_path.display().to_string(),
            entries: published_entries,
        });

        self.store.commit(&self.config.feed_id, started_at)?;

        self.reporter.report(ProgressEvent::MirrorCompleted {
            feed_source: self.config.feed_source.clone(),
            downloaded_count: downloaded,
            skipped_count: skipped,
            dropped_count: plan.dropped_count() + failed.len(),
        });

        Ok(RunOutcome::Completed(MirrorSummary {
            feed_id: self.config.feed_id.clone(),
            started_at,
            total_entries,
            published_entries,
            dropped: plan.dropped_count(),
            downloaded,
            skipped,
            failed,
            document_path: self.layout.document_path.clone(),
        }))
    }

    async fn fetch_upstream(&self) -> Result<rss::Channel, FeedError> {
        let source = &self.config.feed_source;

        if is_url(source) {
            self.reporter
                .report(ProgressEvent::FetchingFeed { url: source.clone() });
            fetch_document(self.cache.client(), source, &self.layout.transient_path).await
        } else {
            parse_feed_file(Path::new(source))
        }
    }
}
