// Error types for the acquisition pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a metadata query failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataErrorKind {
    /// Timeouts, refused connections, rate limiting, 5xx
    Network,
    /// Deleted, private or otherwise missing item
    NotFound,
    /// The URL is not something the source knows how to handle
    Unsupported,
    Unknown,
}

impl std::fmt::Display for MetadataErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::NotFound => write!(f, "not found"),
            Self::Unsupported => write!(f, "unsupported source"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Serialisable tag for [`PipelineError`], for consumers that only need the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MetadataError,
    NoFormatsAvailable,
    InvalidTimeRange,
    TransportError,
    FileNotFound,
    TrimError,
    ExtractionError,
    Busy,
    NotReady,
    UnknownFormat,
    ToolNotFound,
    Io,
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Failed to fetch media info ({kind}): {message}")]
    Metadata {
        kind: MetadataErrorKind,
        message: String,
    },

    #[error("No formats available for this item")]
    NoFormatsAvailable,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Download failed: {0}")]
    Transport(String),

    #[error("Downloaded file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Trim failed: {0}")]
    Trim(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    /// A worker is already running for this pipeline
    #[error("Another job is already in progress")]
    Busy,

    /// Download requested before a successful fetch
    #[error("No media has been fetched yet")]
    NotReady,

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Metadata { .. } => ErrorKind::MetadataError,
            Self::NoFormatsAvailable => ErrorKind::NoFormatsAvailable,
            Self::InvalidTimeRange(_) => ErrorKind::InvalidTimeRange,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::FileNotFound(_) => ErrorKind::FileNotFound,
            Self::Trim(_) => ErrorKind::TrimError,
            Self::Extraction(_) => ErrorKind::ExtractionError,
            Self::Busy => ErrorKind::Busy,
            Self::NotReady => ErrorKind::NotReady,
            Self::UnknownFormat(_) => ErrorKind::UnknownFormat,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn metadata(kind: MetadataErrorKind, message: impl Into<String>) -> Self {
        Self::Metadata {
            kind,
            message: message.into(),
        }
    }

    /// Classify a metadata failure from the tool's diagnostic output
    pub fn from_metadata_stderr(stderr: &str) -> Self {
        Self::metadata(classify_metadata_failure(stderr), stderr.trim())
    }
}

/// Plain I/O failure. Missing binaries are mapped at spawn time by
/// `utils::spawn_error`, never here.
impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Smart detection of metadata failure kinds from yt-dlp stderr
pub fn classify_metadata_failure(stderr: &str) -> MetadataErrorKind {
    let s = stderr.to_lowercase();

    // Unsupported first: yt-dlp also says "unable to download" for these
    if s.contains("unsupported url") || s.contains("is not a valid url") {
        return MetadataErrorKind::Unsupported;
    }

    if s.contains("video unavailable")
        || s.contains("private video")
        || s.contains("does not exist")
        || s.contains("http error 404")
        || s.contains("has been removed")
    {
        return MetadataErrorKind::NotFound;
    }

    if s.contains("timed out")
        || s.contains("timeout")
        || s.contains("connection")
        || s.contains("network is unreachable")
        || s.contains("name or service not known")
        || s.contains("getaddrinfo")
        || s.contains("http error 429")
        || s.contains("http error 5")
    {
        return MetadataErrorKind::Network;
    }

    MetadataErrorKind::Unknown
}
