// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{DocumentError, FeedError};
use crate::transfer::partial_path;

/// Parse RSS feed XML bytes into a channel
///
/// Channel metadata, namespaces and extension elements are kept as they are
/// so that the mirrored document can be written back out unchanged apart
/// from the rewritten entries.
pub fn parse_document(xml_bytes: &[u8]) -> Result<rss::Channel, FeedError> {
    Ok(rss::Channel::read_from(xml_bytes)?)
}

/// Write `channel` to `path`, replacing any previous document atomically
///
/// The output starts with an XML declaration carrying the encoding.
pub fn write_document(channel: &rss::Channel, path: &Path) -> Result<(), DocumentError> {
    let partial = partial_path(path);

    let file = File::create(&partial).map_err(|e| DocumentError::CreateFailed {
        path: partial.clone(),
        source: e,
    })?;

    let result = channel
        .write_to(BufWriter::new(file))
        .map_err(DocumentError::from)
        .and_then(|mut writer| {
            writer.flush().map_err(|e| DocumentError::WriteFailed {
                path: partial.clone(),
                source: e,
            })
        })
        .and_then(|()| {
            std::fs::rename(&partial, path).map_err(|e| DocumentError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            })
        });

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }

    result
}
