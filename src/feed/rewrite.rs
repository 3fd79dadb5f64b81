use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use url::Url;

use crate::config::{MirrorConfig, MirrorLayout, TEST_MODE_ENTRY_LIMIT};
use crate::error::FeedError;
use crate::progress::DropReason;
use crate::transfer::PARTIAL_SUFFIX;

/// An entry that will be mirrored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeptEntry {
    /// Index of the entry in the upstream document
    pub position: usize,
    /// Enclosure URL as published upstream
    pub original_url: String,
    /// Enclosure URL pointing at the mirror
    pub rewritten_url: String,
    /// Base filename shared by the local file and the rewritten URL
    pub filename: String,
    pub local_path: PathBuf,
}

/// Outcome of classifying one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    Keep(KeptEntry),
    Drop {
        position: usize,
        /// Filename if known, otherwise the entry title
        label: String,
        reason: DropReason,
    },
}

/// Per-entry decisions, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorPlan {
    pub decisions: Vec<EntryDecision>,
}

impl MirrorPlan {
    /// Entries to mirror, in document order
    pub fn kept(&self) -> impl Iterator<Item = &KeptEntry> {
        self.decisions.iter().filter_map(|decision| match decision {
            EntryDecision::Keep(kept) => Some(kept),
            EntryDecision::Drop { .. } => None,
        })
    }

    pub fn kept_count(&self) -> usize {
        self.kept().count()
    }

    pub fn dropped_count(&self) -> usize {
        self.decisions.len() - self.kept_count()
    }
}

/// Classify every entry and plan the rewritten enclosure links
///
/// Entries are visited in document order. In test mode every entry after the
/// first [`TEST_MODE_ENTRY_LIMIT`] is dropped without being inspected. All
/// other entries must carry a parseable `pubDate` and an enclosure; one that
/// does not fails the whole plan. Entries older than `max_age_days` whole
/// days are dropped unless `include_all` is set.
pub fn plan_mirror(
    items: &[rss::Item],
    config: &MirrorConfig,
    layout: &MirrorLayout,
    now: DateTime<Utc>,
) -> Result<MirrorPlan, FeedError> {
    let mut decisions = Vec::with_capacity(items.len());

    for (position, item) in items.iter().enumerate() {
        let counter = position + 1;

        if config.test_mode && counter > TEST_MODE_ENTRY_LIMIT {
            decisions.push(EntryDecision::Drop {
                position,
                label: label_for(item),
                reason: DropReason::TestLimit,
            });
            continue;
        }

        let published = entry_pub_date(item, counter)?;
        let original_url = entry_enclosure_url(item, counter)?;
        let filename = avoid_reserved_name(enclosure_filename(&original_url, counter)?, layout);

        let age_days = (now - published.with_timezone(&Utc)).num_days();
        if age_days > config.max_age_days && !config.include_all {
            decisions.push(EntryDecision::Drop {
                position,
                label: filename,
                reason: DropReason::TooOld { age_days },
            });
            continue;
        }

        decisions.push(EntryDecision::Keep(KeptEntry {
            position,
            rewritten_url: rewrite_href(&config.new_base_href, &config.feed_id, &filename),
            local_path: layout.media_path(&filename),
            original_url,
            filename,
        }));
    }

    Ok(MirrorPlan { decisions })
}

/// Build the mirrored feed entries from `items` and a plan made for them
///
/// Dropped entries and kept entries whose position is in `excluded` are left
/// out; all others are copied with their enclosure pointing at the mirror.
/// The relative order of the remaining entries is unchanged.
pub fn apply_plan(
    items: &[rss::Item],
    plan: &MirrorPlan,
    excluded: &HashSet<usize>,
) -> Vec<rss::Item> {
    plan.kept()
        .filter(|kept| !excluded.contains(&kept.position))
        .filter_map(|kept| {
            let mut item = items.get(kept.position)?.clone();
            if let Some(enclosure) = item.enclosure.as_mut() {
                enclosure.set_url(kept.rewritten_url.clone());
            }
            Some(item)
        })
        .collect()
}

/// Join the mirror base URL, feed identity and filename with single slashes
pub fn rewrite_href(new_base_href: &str, feed_id: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        new_base_href.trim_end_matches('/'),
        feed_id.trim_matches('/'),
        filename
    )
}

/// Last path segment of an enclosure URL, cleaned up for use on disk
pub fn enclosure_filename(url: &str, position: usize) -> Result<String, FeedError> {
    let parsed = Url::parse(url).map_err(|e| FeedError::InvalidEnclosureUrl {
        position,
        url: url.to_string(),
        source: e,
    })?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(sanitize_filename::sanitize)
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .ok_or_else(|| FeedError::MissingFilename {
            position,
            url: url.to_string(),
        })
}

/// Rename media files that would clash with files the mirror manages itself
///
/// Names ending in `.partial` are swept as interrupted transfers, and the
/// document and state file share the feed directory with the media.
fn avoid_reserved_name(filename: String, layout: &MirrorLayout) -> String {
    if let Some(stem) = filename.strip_suffix(PARTIAL_SUFFIX) {
        return format!("{stem}_{}", &PARTIAL_SUFFIX[1..]);
    }

    let state_tmp = layout.state_path.with_extension("log.tmp");
    let reserved = [&layout.document_path, &layout.state_path, &state_tmp]
        .into_iter()
        .filter_map(|path| path.file_name())
        .any(|name| name == filename.as_str());

    if reserved { format!("_{filename}") } else { filename }
}

/// Parse a feed date such as `Mon, 15 Jan 2024 12:00:00 GMT`
///
/// The weekday is not checked against the date, and `UTC` is accepted as a
/// zone name next to the RFC 2822 ones.
pub fn parse_pub_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = date_str.trim();
    DateTime::parse_from_rfc2822(trimmed)
        .ok()
        .or_else(|| parse_relaxed_date(trimmed))
}

/// Dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date_str) {
        return Some(parsed);
    }

    let body = strip_weekday(date_str);

    if let Some((rest, zone)) = body.rsplit_once(' ')
        && ["GMT", "UTC", "UT", "Z"]
            .iter()
            .any(|name| zone.eq_ignore_ascii_case(name))
    {
        return ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(rest.trim(), format).ok())
            .map(|naive| naive.and_utc().fixed_offset());
    }

    ["%d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M %z", "%Y-%m-%d %H:%M:%S %z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(body, format).ok())
}

/// Drop a leading `Mon, ` so a wrong weekday doesn't reject the date
fn strip_weekday(date_str: &str) -> &str {
    match date_str.split_once(',') {
        Some((day, rest)) if day.trim().chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => date_str,
    }
}

fn entry_pub_date(item: &rss::Item, position: usize) -> Result<DateTime<FixedOffset>, FeedError> {
    let date_str = item.pub_date().ok_or_else(|| FeedError::MissingPubDate {
        position,
        title: title_of(item),
    })?;

    parse_pub_date(date_str).ok_or_else(|| FeedError::InvalidDate {
        position,
        date_str: date_str.to_string(),
    })
}

fn entry_enclosure_url(item: &rss::Item, position: usize) -> Result<String, FeedError> {
    item.enclosure()
        .map(|enclosure| enclosure.url().trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| FeedError::MissingEnclosure {
            position,
            title: title_of(item),
        })
}

fn title_of(item: &rss::Item) -> String {
    item.title().unwrap_or("Untitled Entry").to_string()
}

fn label_for(item: &rss::Item) -> String {
    item.enclosure()
        .and_then(|enclosure| enclosure_filename(enclosure.url(), 0).ok())
        .unwrap_or_else(|| title_of(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::path::Path;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn config() -> MirrorConfig {
        let mut config = MirrorConfig::new(
            "https://upstream.example/feed.xml",
            "show",
            "https://x/",
            "/srv/mirror",
        );
        config.max_age_days = 30;
        config
    }

    fn item(name: &str, published: DateTime<Utc>) -> rss::Item {
        let mut enclosure = rss::Enclosure::default();
        enclosure.set_url(format!("https://upstream.example/media/{name}"));
        enclosure.set_mime_type("audio/mpeg");

        let mut item = rss::Item::default();
        item.set_title(name.to_string());
        item.set_pub_date(published.to_rfc2822());
        item.set_enclosure(enclosure);
        item
    }

    fn plan(items: &[rss::Item], config: &MirrorConfig) -> MirrorPlan {
        plan_mirror(items, config, &config.layout(), now()).unwrap()
    }

    fn kept_names(plan: &MirrorPlan) -> Vec<String> {
        plan.kept().map(|kept| kept.filename.clone()).collect()
    }

    #[test]
    fn rewrites_link_and_local_path() {
        let items = vec![item("ep42.mp3", now() - Duration::days(1))];
        let plan = plan(&items, &config());

        let kept: Vec<_> = plan.kept().collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rewritten_url, "https://x/show/ep42.mp3");
        assert_eq!(kept[0].local_path, Path::new("/srv/mirror/show/ep42.mp3"));
        assert_eq!(
            kept[0].original_url,
            "https://upstream.example/media/ep42.mp3"
        );
    }

    #[test]
    fn rewrite_href_uses_single_slashes() {
        assert_eq!(rewrite_href("https://x", "show", "a.mp3"), "https://x/show/a.mp3");
        assert_eq!(rewrite_href("https://x/", "show", "a.mp3"), "https://x/show/a.mp3");
        assert_eq!(
            rewrite_href("https://x/pods//", "show", "a.mp3"),
            "https://x/pods/show/a.mp3"
        );
    }

    #[test]
    fn age_boundary_is_inclusive() {
        let items = vec![
            item("exact.mp3", now() - Duration::days(30)),
            item("almost.mp3", now() - Duration::days(30) - Duration::hours(23)),
            item("older.mp3", now() - Duration::days(31)),
        ];
        let plan = plan(&items, &config());

        assert_eq!(kept_names(&plan), vec!["exact.mp3", "almost.mp3"]);
        assert_eq!(
            plan.decisions[2],
            EntryDecision::Drop {
                position: 2,
                label: "older.mp3".to_string(),
                reason: DropReason::TooOld { age_days: 31 },
            }
        );
    }

    #[test]
    fn include_all_keeps_old_entries() {
        let items = vec![item("ancient.mp3", now() - Duration::days(3000))];
        let mut config = config();
        config.include_all = true;

        assert_eq!(kept_names(&plan(&items, &config)), vec!["ancient.mp3"]);
    }

    #[test]
    fn test_mode_keeps_at_most_ten_entries() {
        let items: Vec<_> = (0..25)
            .map(|n| item(&format!("ep{n}.mp3"), now() - Duration::days(n)))
            .collect();
        let mut config = config();
        config.test_mode = true;

        let plan = plan(&items, &config);

        let expected: Vec<_> = (0..10).map(|n| format!("ep{n}.mp3")).collect();
        assert_eq!(kept_names(&plan), expected);
        assert_eq!(plan.dropped_count(), 15);
        for decision in &plan.decisions[10..] {
            assert!(matches!(
                decision,
                EntryDecision::Drop {
                    reason: DropReason::TestLimit,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_mode_cap_counts_dropped_entries_too() {
        // Entries 0..5 are too old; they still use up the test-mode budget
        let items: Vec<_> = (0..25)
            .map(|n| {
                let age = if n < 5 { 100 } else { 1 };
                item(&format!("ep{n}.mp3"), now() - Duration::days(age))
            })
            .collect();
        let mut config = config();
        config.test_mode = true;

        let plan = plan(&items, &config);

        let expected: Vec<_> = (5..10).map(|n| format!("ep{n}.mp3")).collect();
        assert_eq!(kept_names(&plan), expected);
    }

    #[test]
    fn entries_past_test_cap_are_not_validated() {
        let mut items: Vec<_> = (0..10)
            .map(|n| item(&format!("ep{n}.mp3"), now()))
            .collect();
        items.push(rss::Item::default());
        let mut config = config();
        config.test_mode = true;

        assert_eq!(plan(&items, &config).kept_count(), 10);
    }

    #[test]
    fn missing_pub_date_is_fatal() {
        let mut broken = item("ep.mp3", now());
        broken.pub_date = None;

        let result = plan_mirror(&[broken], &config(), &config().layout(), now());
        assert!(matches!(
            result,
            Err(FeedError::MissingPubDate { position: 1, .. })
        ));
    }

    #[test]
    fn unparsable_pub_date_is_fatal() {
        let mut broken = item("ep.mp3", now());
        broken.set_pub_date("sometime last week".to_string());

        let result = plan_mirror(&[broken], &config(), &config().layout(), now());
        assert!(matches!(result, Err(FeedError::InvalidDate { .. })));
    }

    #[test]
    fn missing_enclosure_is_fatal_even_for_old_entries() {
        let mut broken = item("ep.mp3", now() - Duration::days(400));
        broken.enclosure = None;

        let result = plan_mirror(&[broken], &config(), &config().layout(), now());
        assert!(matches!(result, Err(FeedError::MissingEnclosure { .. })));
    }

    #[test]
    fn enclosure_without_filename_is_fatal() {
        assert!(matches!(
            enclosure_filename("https://upstream.example/", 3),
            Err(FeedError::MissingFilename { position: 3, .. })
        ));
        assert!(matches!(
            enclosure_filename("not a url", 3),
            Err(FeedError::InvalidEnclosureUrl { .. })
        ));
    }

    #[test]
    fn enclosure_filename_ignores_query_string() {
        assert_eq!(
            enclosure_filename("https://cdn.example/a/b/ep7.mp3?token=abc", 1).unwrap(),
            "ep7.mp3"
        );
    }

    #[test]
    fn parses_feed_date_formats() {
        assert!(parse_pub_date("Mon, 15 Jan 2024 12:00:00 GMT").is_some());
        assert!(parse_pub_date("Mon, 15 Jan 2024 12:00:00 +0100").is_some());
        assert!(parse_pub_date(" Mon, 15 Jan 2024 12:00:00 UT ").is_some());
        assert!(parse_pub_date("2024-01-15T12:00:00+00:00").is_some());
        assert!(parse_pub_date("15/01/2024").is_none());
    }

    #[test]
    fn wrong_weekday_does_not_reject_date() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        for date in [
            "Tue, 15 Jan 2024 12:00:00 GMT",
            "Tue, 15 Jan 2024 12:00:00 +0000",
            "Sun, 15 Jan 2024 13:00:00 +0100",
        ] {
            let parsed = parse_pub_date(date).unwrap_or_else(|| panic!("{date} rejected"));
            assert_eq!(parsed.with_timezone(&Utc), expected, "{date}");
        }
    }

    #[test]
    fn utc_zone_name_is_accepted() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        for date in [
            "Mon, 15 Jan 2024 12:00:00 UTC",
            "Wed, 15 Jan 2024 12:00:00 utc",
            "15 Jan 2024 12:00:00 Z",
            "2024-01-15T12:00:00Z",
        ] {
            let parsed = parse_pub_date(date).unwrap_or_else(|| panic!("{date} rejected"));
            assert_eq!(parsed.with_timezone(&Utc), expected, "{date}");
        }
    }

    #[test]
    fn mismatched_weekday_entry_is_kept() {
        let mut entry = item("ep1.mp3", now());
        entry.pub_date = Some("Mon, 14 Jun 2024 12:00:00 UTC".to_string());

        let plan = plan(&[entry], &config());

        assert_eq!(kept_names(&plan), vec!["ep1.mp3"]);
    }

    #[test]
    fn media_names_clashing_with_mirror_files_are_renamed() {
        let items = vec![
            item("show.rss", now()),
            item("last_download.log", now()),
            item("ep1.mp3.partial", now()),
            item("ep2.mp3", now()),
        ];

        let plan = plan(&items, &config());

        assert_eq!(
            kept_names(&plan),
            vec!["_show.rss", "_last_download.log", "ep1.mp3_partial", "ep2.mp3"]
        );
        let kept: Vec<_> = plan.kept().collect();
        assert_eq!(kept[0].rewritten_url, "https://x/show/_show.rss");
        assert_eq!(kept[0].original_url, "https://upstream.example/media/show.rss");
        assert_eq!(kept[2].local_path, Path::new("/srv/mirror/show/ep1.mp3_partial"));
    }

    #[test]
    fn apply_plan_preserves_order_and_rewrites() {
        let items = vec![
            item("a.mp3", now()),
            item("old.mp3", now() - Duration::days(90)),
            item("b.mp3", now()),
            item("c.mp3", now()),
        ];
        let plan = plan(&items, &config());

        let mirrored = apply_plan(&items, &plan, &HashSet::new());

        let urls: Vec<_> = mirrored
            .iter()
            .map(|item| item.enclosure().unwrap().url().to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://x/show/a.mp3",
                "https://x/show/b.mp3",
                "https://x/show/c.mp3"
            ]
        );
        // The input is left untouched
        assert_eq!(
            items[0].enclosure().unwrap().url(),
            "https://upstream.example/media/a.mp3"
        );
    }

    #[test]
    fn apply_plan_leaves_out_excluded_entries() {
        let items = vec![item("a.mp3", now()), item("b.mp3", now())];
        let plan = plan(&items, &config());

        let mirrored = apply_plan(&items, &plan, &HashSet::from([0]));

        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].title(), Some("b.mp3"));
    }

    #[test]
    fn apply_plan_passes_other_metadata_through() {
        let mut original = item("a.mp3", now());
        original.set_description("Show notes".to_string());
        original.set_guid(rss::Guid {
            value: "guid-a".to_string(),
            permalink: false,
        });
        let items = vec![original];

        let mirrored = apply_plan(&items, &plan(&items, &config()), &HashSet::new());

        assert_eq!(mirrored[0].description(), Some("Show notes"));
        assert_eq!(mirrored[0].guid().map(|g| g.value()), Some("guid-a"));
        assert_eq!(mirrored[0].pub_date(), items[0].pub_date());
        assert_eq!(
            mirrored[0].enclosure().unwrap().mime_type(),
            "audio/mpeg"
        );
    }
}
