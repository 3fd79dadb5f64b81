use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching, parsing or classifying the feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Entry {position} ('{title}') has no publication date")]
    MissingPubDate { position: usize, title: String },

    #[error("Failed to parse date '{date_str}' of entry {position}")]
    InvalidDate { position: usize, date_str: String },

    #[error("Entry {position} ('{title}') has no enclosure")]
    MissingEnclosure { position: usize, title: String },

    #[error("Entry {position} has an invalid enclosure URL '{url}': {source}")]
    InvalidEnclosureUrl {
        position: usize,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Enclosure URL '{url}' of entry {position} has no filename")]
    MissingFilename { position: usize, url: String },
}

/// Errors that can occur while transferring a URL to disk
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    FinalizeFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors that can occur while reading or committing mirror state
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while writing the mirrored feed document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to create document {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize feed document: {0}")]
    SerializeFailed(#[from] rss::Error),

    #[error("Failed to write document {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised when validating a mirror configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Feed name '{0}' must be a single, non-empty path component")]
    InvalidFeedId(String),

    #[error("New base href '{href}' is not an absolute URL: {source}")]
    InvalidBaseHref {
        href: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Feed source '{0}' is neither an http(s) URL nor an existing file")]
    InvalidFeedSource(String),
}

/// Top-level errors for a mirror run
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Download of {filename} failed: {source}")]
    Download {
        filename: String,
        #[source]
        source: DownloadError,
    },

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}
