// Download orchestrator: selector synthesis, transfer, output path resolution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::errors::PipelineError;
use super::models::SelectableFormat;
use super::traits::{MediaTransport, ProgressEmitter};
use super::utils::sanitize_file_stem;

/// Extensions the transport may normalise the output to, in search order
pub const KNOWN_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "m4a", "mp3", "opus", "ogg", "wav", "flac", "mov", "avi",
];

pub struct DownloadOrchestrator {
    transport: Arc<dyn MediaTransport>,
}

impl DownloadOrchestrator {
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        Self { transport }
    }

    /// Download `format` of `url` into `output_dir` and return the file written.
    pub async fn download(
        &self,
        url: &str,
        title: &str,
        format: &SelectableFormat,
        output_dir: &Path,
        filename_template: &str,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError> {
        let selector = format.selector();
        let template = output_dir.join(filename_template);
        let expected = expected_output_path(output_dir, title, format.expected_ext());

        info!(
            "[Downloader] {} via {} (selector '{}')",
            url,
            self.transport.name(),
            selector
        );

        let reported = self
            .transport
            .download(url, &selector, &template, progress)
            .await?;

        progress.stage("finished, processing").await;

        // A path still containing template fields was never filled in
        let reported = Some(reported).filter(|p| !p.to_string_lossy().contains("%("));
        resolve_output_path(reported.as_deref(), &expected).await
    }
}

/// `<dir>/<sanitized title>.<ext>`
pub fn expected_output_path(output_dir: &Path, title: &str, ext: &str) -> PathBuf {
    output_dir.join(format!("{}.{}", sanitize_file_stem(title), ext))
}

/// Find the file the transport actually wrote.
///
/// Order: the reported path, the expected base name with each known media
/// extension, then any file in the directory whose name starts with the
/// expected base name.
pub async fn resolve_output_path(
    reported: Option<&Path>,
    expected: &Path,
) -> Result<PathBuf, PipelineError> {
    for candidate in reported.into_iter().chain(std::iter::once(expected)) {
        if is_file(candidate).await {
            debug!("[Downloader] Output at {}", candidate.display());
            return Ok(candidate.to_path_buf());
        }
    }

    // Transport naming wins over ours when it reported something
    let base = reported.unwrap_or(expected);
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    for ext in KNOWN_MEDIA_EXTENSIONS {
        let candidate = base.with_extension(ext);
        if is_file(&candidate).await {
            info!("[Downloader] Output normalised to {}", candidate.display());
            return Ok(candidate);
        }
    }

    if !stem.is_empty() {
        if let Some(dir) = base.parent() {
            if let Some(found) = find_by_prefix(dir, &stem).await {
                info!("[Downloader] Output found by prefix: {}", found.display());
                return Ok(found);
            }
        }
    }

    warn!("[Downloader] Output not found, expected {}", expected.display());
    Err(PipelineError::FileNotFound(expected.to_path_buf()))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// First file (by name) in `dir` whose name starts with `prefix`
async fn find_by_prefix(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut matches = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        // Skip partial downloads
        if name.starts_with(prefix) && !name.ends_with(".part") && is_file(&entry.path()).await {
            matches.push(entry.path());
        }
    }
    matches.sort();
    matches.into_iter().next()
}
