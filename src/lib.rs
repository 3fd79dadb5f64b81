pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod log;
pub mod progress;
pub mod state;
pub mod transfer;

// Re-export main types for convenience
pub use cache::{CacheOutcome, EnclosureCache};
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use config::{EnclosureFailurePolicy, MirrorConfig, MirrorLayout};
pub use engine::{FailedEntry, MirrorEngine, MirrorSummary, RunOutcome};
pub use error::{ConfigError, DocumentError, DownloadError, FeedError, MirrorError, StateError};
pub use feed::{MirrorPlan, apply_plan, is_url, plan_mirror};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use log::LogFileReporter;
pub use progress::{
    DropReason, FanoutReporter, NoopReporter, ProgressEvent, ProgressReporter,
    SharedProgressReporter,
};
pub use state::{FileStateStore, GateDecision, MemoryStateStore, MirrorStateStore};
