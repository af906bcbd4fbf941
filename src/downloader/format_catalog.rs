// FormatCatalog - turns raw encodings into selectable options
//
// Handles:
// - Audio/video classification from structured descriptor fields
// - Label synthesis ("1080p - video", "m4a 128kbps - audio")
// - Deduplication by format id (first occurrence wins)
// - Display order: videos by descending height, audio last

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::models::{EncodingDescriptor, FormatKind, SelectableFormat};

/// Containers that only ever carry audio when no height is reported
const AUDIO_CONTAINERS: &[&str] = &[
    "m4a", "mp3", "aac", "opus", "ogg", "oga", "wav", "flac", "weba",
];

/// Ordered, deduplicated list of selectable formats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCatalog {
    formats: Vec<SelectableFormat>,
}

impl FormatCatalog {
    /// Build the catalog from raw encodings. Pure: same input, same output.
    pub fn build(encodings: &[EncodingDescriptor]) -> Self {
        let mut seen = HashSet::new();
        let mut formats: Vec<SelectableFormat> = encodings
            .iter()
            .filter(|e| seen.insert(e.format_id.as_str()))
            .map(Self::to_selectable)
            .collect();

        // Stable: equal keys keep source order
        formats.sort_by_key(Self::sort_key);

        Self { formats }
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn formats(&self) -> &[SelectableFormat] {
        &self.formats
    }

    pub fn find(&self, format_id: &str) -> Option<&SelectableFormat> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }

    /// Select by position in display order (0-based)
    pub fn get(&self, index: usize) -> Option<&SelectableFormat> {
        self.formats.get(index)
    }

    /// Classify a single encoding
    pub fn classify(encoding: &EncodingDescriptor) -> FormatKind {
        let audio_container = AUDIO_CONTAINERS
            .iter()
            .any(|c| encoding.ext.eq_ignore_ascii_case(c));

        if !encoding.has_video || (audio_container && encoding.height.is_none()) {
            FormatKind::Audio
        } else {
            FormatKind::Video
        }
    }

    fn to_selectable(encoding: &EncodingDescriptor) -> SelectableFormat {
        let kind = Self::classify(encoding);
        let filesize = encoding.effective_size();

        let mut label = match kind {
            FormatKind::Video => format!("{} - video", Self::resolution_label(encoding)),
            FormatKind::Audio => match encoding.bitrate_kbps {
                Some(kbps) if kbps > 0.0 => {
                    format!("{} {:.0}kbps - audio", encoding.ext, kbps)
                }
                _ => format!("{} - audio", encoding.ext),
            },
        };
        if let Some(size) = Self::format_size(filesize) {
            label.push_str(&format!(" ({})", size));
        }

        SelectableFormat {
            kind,
            format_id: encoding.format_id.clone(),
            label,
            has_embedded_audio: kind == FormatKind::Video && encoding.has_audio,
            height: encoding.height,
            filesize,
            ext: encoding.ext.clone(),
        }
    }

    /// Resolution note, else "<height>p", else the extension
    fn resolution_label(encoding: &EncodingDescriptor) -> String {
        if let Some(note) = encoding.resolution_note.as_deref() {
            if !note.trim().is_empty() {
                return note.trim().to_string();
            }
        }
        match encoding.height {
            Some(h) => format!("{}p", h),
            None => encoding.ext.clone(),
        }
    }

    /// (group, height rank): videos with height, videos without, audio
    fn sort_key(format: &SelectableFormat) -> (u8, std::cmp::Reverse<u32>) {
        match (format.kind, format.height) {
            (FormatKind::Video, Some(h)) => (0, std::cmp::Reverse(h)),
            (FormatKind::Video, None) => (1, std::cmp::Reverse(0)),
            (FormatKind::Audio, _) => (2, std::cmp::Reverse(0)),
        }
    }

    /// Format file size for display
    fn format_size(bytes: Option<u64>) -> Option<String> {
        bytes.map(|b| format!("{:.2} MB", b as f64 / 1_048_576.0))
    }
}
