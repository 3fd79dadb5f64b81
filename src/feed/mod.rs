mod document;
mod fetch;
mod rewrite;

pub use document::{parse_document, write_document};
pub use fetch::{fetch_document, is_url, parse_feed_file, read_feed_file};
pub use rewrite::{
    EntryDecision, KeptEntry, MirrorPlan, apply_plan, enclosure_filename, parse_pub_date,
    plan_mirror, rewrite_href,
};
