// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::transfer::fetch_to_path;

use super::document::parse_document;

/// Scratch file that is removed when it goes out of scope
struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Download the upstream document to `transient_path` and parse it
///
/// The transient file is gone when this returns, whether fetching or
/// parsing succeeded or not.
pub async fn fetch_document<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    transient_path: &Path,
) -> Result<rss::Channel, FeedError> {
    let transient = TransientFile::new(transient_path);

    fetch_to_path(client, url, &transient.path, |_, _| {})
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    let bytes = read_feed_file(&transient.path)?;
    parse_document(&bytes)
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Parse a feed document from a local file
pub fn parse_feed_file(path: &Path) -> Result<rss::Channel, FeedError> {
    let bytes = read_feed_file(path)?;
    parse_document(&bytes)
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
