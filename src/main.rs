use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use podmirror::{
    DropReason, EnclosureFailurePolicy, FanoutReporter, FileStateStore, LogFileReporter,
    MirrorConfig, MirrorEngine, ProgressEvent, ProgressReporter, ReqwestClient, RunOutcome,
    SharedProgressReporter, SystemClock,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static SLEEP: Emoji<'_, '_> = Emoji("💤 ", "[z] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Mirror a podcast RSS feed and its media files to a local web root
#[derive(Parser, Debug)]
#[command(name = "podmirror")]
#[command(about = "Mirror a podcast RSS feed and its media files to a local web root")]
#[command(version)]
struct Args {
    /// Upstream RSS feed URL (or path to a local RSS file)
    #[arg(short = 'i', long)]
    input_href: String,

    /// Local podcast name; files and the mirrored feed go into a folder of this name
    #[arg(short = 'p', long)]
    podcast_name: String,

    /// Base URL the mirror is served from; enclosure links are rewritten to it
    #[arg(short = 'n', long)]
    new_href: String,

    /// Oldest episode to mirror, in days
    #[arg(long, default_value_t = podmirror::config::DEFAULT_MAX_AGE_DAYS)]
    oldest_pod: i64,

    /// Only process the first 10 episodes and ignore the once-a-day limit
    #[arg(long)]
    test: bool,

    /// Run even if the last run was less than a day ago
    #[arg(short, long)]
    force: bool,

    /// Mirror episodes regardless of their age
    #[arg(long)]
    include_all: bool,

    /// Directory holding the podcast folders and the log file
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Pause after each downloaded file, in milliseconds
    #[arg(long, default_value = "1000")]
    delay_ms: u64,

    /// Give up on a single request after this many seconds
    #[arg(long, default_value = "3600")]
    timeout_secs: u64,

    /// Leave out episodes whose file cannot be downloaded instead of failing
    #[arg(long)]
    skip_failed: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    main_bar: ProgressBar,
    multi: MultiProgress,
    download_bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} {wide_msg}") {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            main_bar,
            multi,
            download_bar: Mutex::new(None),
        }
    }

    fn start_download_bar(&self, message: String) {
        let bar = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        )) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bar.set_message(message);

        if let Ok(mut slot) = self.download_bar.lock()
            && let Some(previous) = slot.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn with_download_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.download_bar.lock()
            && let Some(bar) = slot.as_ref()
        {
            f(bar);
        }
    }

    fn finish_download_bar(&self) {
        if let Ok(mut slot) = self.download_bar.lock()
            && let Some(bar) = slot.take()
        {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::MirrorStarting { .. } | ProgressEvent::DocumentWritten { .. } => {}

            ProgressEvent::GateClosed {
                elapsed_secs,
                threshold_secs,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "{SLEEP}{} last run was {} ago, next run possible in {}",
                    "Nothing to do:".bold().yellow(),
                    format_secs(elapsed_secs).cyan(),
                    format_secs(threshold_secs - elapsed_secs).cyan()
                );
            }

            ProgressEvent::PartialFilesCleanedUp { count } => {
                self.main_bar.println(format!(
                    "  {} {} partial file(s) from an interrupted run",
                    "Removed".dimmed(),
                    count.to_string().yellow()
                ));
            }

            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedPlanned {
                feed_title,
                total_entries,
                kept_entries,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes total, {} to mirror",
                    feed_title.bold().green(),
                    total_entries.to_string().cyan(),
                    kept_entries.to_string().yellow()
                ));
            }

            ProgressEvent::EntryDropped { filename, reason } => {
                if let DropReason::DownloadFailed = reason {
                    self.main_bar.println(format!(
                        "  {FAILURE}{} left out of the feed",
                        filename.red()
                    ));
                }
            }

            ProgressEvent::EnclosureSkipped { .. } => {}

            ProgressEvent::DownloadStarting {
                filename,
                entry_index,
                total_entries,
            } => {
                self.start_download_bar(format!(
                    "[{}/{}] {}",
                    (entry_index + 1).to_string().cyan(),
                    total_entries.to_string().cyan(),
                    filename
                ));
            }

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                self.with_download_bar(|bar| {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                });
            }

            ProgressEvent::DownloadCompleted { filename, .. } => {
                self.main_bar
                    .println(format!("  {SUCCESS}{}", filename.green()));
                self.finish_download_bar();
            }

            ProgressEvent::DownloadFailed { filename, error } => {
                self.with_download_bar(|bar| {
                    bar.abandon_with_message(format!(
                        "{FAILURE}{} - {}",
                        filename.red(),
                        error.red()
                    ));
                });
                if let Ok(mut slot) = self.download_bar.lock() {
                    slot.take();
                }
            }

            ProgressEvent::MirrorCompleted {
                downloaded_count,
                skipped_count,
                dropped_count,
                ..
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} already present, {} left out",
                    "Mirror complete:".bold().green(),
                    downloaded_count.to_string().green().bold(),
                    skipped_count.to_string().yellow(),
                    dropped_count.to_string().dimmed()
                );
            }

            ProgressEvent::MirrorFailed { error } => {
                self.finish_download_bar();
                self.main_bar.finish_and_clear();
                eprintln!("\n{FAILURE}{} {}", "Mirror failed:".bold().red(), error.red());
            }
        }
    }
}

fn format_secs(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create root directory {}", root.display()))?;

    let mut config = MirrorConfig::new(args.input_href, args.podcast_name, args.new_href, root);
    config.max_age_days = args.oldest_pod;
    config.test_mode = args.test;
    config.force = args.force;
    config.include_all = args.include_all;
    config.pacing_delay = Duration::from_millis(args.delay_ms);
    if args.skip_failed {
        config.failure_policy = EnclosureFailurePolicy::SkipEntry;
    }

    let interactive = !args.quiet && !args.json;
    if interactive {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podmirror".bold().magenta(),
            "- Podcast Mirror".dimmed()
        );
    }

    let layout = config.layout();
    let clock = SystemClock::shared();

    let log = LogFileReporter::open(&layout.log_path, clock.clone())
        .with_context(|| format!("Failed to open log file {}", layout.log_path.display()))?;
    let mut reporters: Vec<SharedProgressReporter> = vec![Arc::new(log)];
    if interactive {
        reporters.push(Arc::new(IndicatifReporter::new()));
    }
    let reporter = FanoutReporter::shared(reporters);

    let client = ReqwestClient::with_timeout(Duration::from_secs(args.timeout_secs))
        .context("Failed to create HTTP client")?;
    let store = FileStateStore::new(&layout.root_dir);

    let engine = MirrorEngine::new(config, client, store, clock, reporter);
    let outcome = engine.run().await.context("Failed to mirror podcast")?;

    if args.json {
        let json = match &outcome {
            RunOutcome::Completed(summary) => serde_json::to_string_pretty(summary)?,
            RunOutcome::Gated { elapsed_secs } => {
                serde_json::json!({ "gated": true, "elapsed_secs": elapsed_secs }).to_string()
            }
        };
        println!("{json}");
    } else if interactive && let RunOutcome::Completed(summary) = &outcome {
        println!(
            "\n{FOLDER}Feed: {}\n",
            summary.document_path.display().to_string().cyan()
        );
    }

    Ok(())
}
