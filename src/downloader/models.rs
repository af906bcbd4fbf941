// Common data models for the pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::PipelineError;
use super::time_range::TrimRequest;

/// One encoding as reported by the metadata source. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingDescriptor {
    /// Opaque token used to request this encoding (e.g. "137", "140")
    pub format_id: String,
    /// Container extension (mp4, webm, m4a)
    pub ext: String,
    pub has_video: bool,
    pub has_audio: bool,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Source-provided resolution note (e.g. "1080p", "720p60")
    pub resolution_note: Option<String>,
    /// Audio bitrate in kbps
    pub bitrate_kbps: Option<f32>,
    /// File size in bytes
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    pub filesize_approx: Option<u64>,
}

impl EncodingDescriptor {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Metadata of a remote media item. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Source URL
    pub url: String,
    pub id: String,
    pub title: String,
    pub uploader: String,
    /// Total duration in seconds, 0 when unknown
    pub duration_seconds: u64,
    /// Raw encodings in source order
    pub encodings: Vec<EncodingDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    Video,
    Audio,
}

/// A user-selectable option derived from the raw encodings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectableFormat {
    pub kind: FormatKind,
    pub format_id: String,
    /// Display label (e.g. "1080p - video", "m4a 128kbps - audio")
    pub label: String,
    /// Only meaningful for video
    pub has_embedded_audio: bool,
    pub height: Option<u32>,
    pub filesize: Option<u64>,
    /// Container extension of the underlying encoding
    pub ext: String,
}

impl SelectableFormat {
    pub fn is_audio(&self) -> bool {
        self.kind == FormatKind::Audio
    }

    /// Format selector string handed to the transport.
    ///
    /// Video without its own audio track asks the transport to merge the best
    /// available audio stream in.
    pub fn selector(&self) -> String {
        if self.is_audio() || self.has_embedded_audio {
            self.format_id.clone()
        } else {
            format!("{}+bestaudio", self.format_id)
        }
    }

    /// Extension the transport is expected to write for this selection
    pub fn expected_ext(&self) -> &str {
        match self.kind {
            // Merged downloads are remuxed into mp4
            FormatKind::Video => "mp4",
            FormatKind::Audio => &self.ext,
        }
    }
}

/// Input of one download+trim+extract run. Discarded when the run ends.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub title: String,
    pub format: SelectableFormat,
    pub trim: TrimRequest,
    pub output_dir: PathBuf,
    /// yt-dlp output template relative to `output_dir`
    pub filename_template: String,
}

/// Progress reported by a running job, in emission order
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Downloading {
        /// 0..=100
        percent: f32,
        speed: String,
        eta: String,
    },
    Stage(String),
    Done(PathBuf),
    Failed(PipelineError),
}

impl ProgressEvent {
    pub fn stage(description: impl Into<String>) -> Self {
        Self::Stage(description.into())
    }

    /// `Done` and `Failed` end a job's event stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}
