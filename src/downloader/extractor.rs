// Metadata fetcher - uses the native `yt-dlp` binary in --dump-json mode
//
// Only queries metadata; --skip-download guarantees no media is written.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::errors::{MetadataErrorKind, PipelineError};
use super::models::{EncodingDescriptor, MediaItem};
use super::traits::MetadataSource;
use super::utils::run_output_with_timeout;
use crate::config::PipelineConfig;

/// CLI-based metadata source using the yt-dlp binary
pub struct YtDlpMetadataSource {
    ytdlp_path: String,
    proxy: Option<String>,
    socket_timeout_secs: u32,
    timeout_secs: u64,
    check_certificates: bool,
}

impl YtDlpMetadataSource {
    pub fn new(ytdlp_path: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            proxy: config.proxy.clone(),
            socket_timeout_secs: config.socket_timeout_secs,
            timeout_secs: config.metadata_timeout_secs,
            check_certificates: config.check_certificates,
        }
    }

    /// Build command arguments
    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
        ];

        if !self.check_certificates {
            args.push("--no-check-certificates".to_string());
        }

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push(url.to_string());
        args
    }
}

/// Parse yt-dlp JSON output into a media item
pub fn parse_media_item(url: &str, stdout: &[u8]) -> Result<MediaItem, PipelineError> {
    let json: serde_json::Value = serde_json::from_slice(stdout).map_err(|e| {
        PipelineError::metadata(MetadataErrorKind::Unknown, format!("Invalid JSON: {}", e))
    })?;

    let duration = json["duration"].as_f64().unwrap_or(0.0);

    Ok(MediaItem {
        url: url.to_string(),
        id: json["id"].as_str().unwrap_or("unknown").to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
        duration_seconds: if duration.is_finite() && duration > 0.0 {
            duration as u64
        } else {
            0
        },
        encodings: parse_formats(&json),
    })
}

fn parse_formats(json: &serde_json::Value) -> Vec<EncodingDescriptor> {
    let Some(formats_array) = json["formats"].as_array() else {
        return Vec::new();
    };

    formats_array
        .iter()
        .filter_map(|f| {
            let format_id = f["format_id"].as_str()?.to_string();
            let codec_present = |key: &str| {
                f[key]
                    .as_str()
                    .map_or(false, |c| c != "none" && !c.is_empty())
            };

            let has_video = codec_present("vcodec");
            let has_audio = codec_present("acodec");
            // Storyboards and other image tracks carry no media streams
            if !has_video && !has_audio {
                return None;
            }

            Some(EncodingDescriptor {
                format_id,
                ext: f["ext"].as_str().unwrap_or("").to_string(),
                has_video,
                has_audio,
                height: f["height"].as_u64().map(|h| h as u32),
                resolution_note: f["format_note"].as_str().map(|s| s.to_string()),
                bitrate_kbps: f["abr"].as_f64().map(|a| a as f32),
                filesize: f["filesize"].as_u64(),
                filesize_approx: f["filesize_approx"].as_u64(),
            })
        })
        .collect()
}

#[async_trait]
impl MetadataSource for YtDlpMetadataSource {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn fetch(&self, url: &str) -> Result<MediaItem, PipelineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PipelineError::metadata(
                MetadataErrorKind::Unsupported,
                "Please enter a URL",
            ));
        }

        let args = self.build_args(url);
        debug!("[Extractor] {} {}", self.ytdlp_path, args.join(" "));

        let output = match run_output_with_timeout(&self.ytdlp_path, &args, self.timeout_secs).await
        {
            Ok(output) => output,
            Err(PipelineError::Io(msg)) if msg.contains("timed out") => {
                return Err(PipelineError::metadata(MetadataErrorKind::Network, msg));
            }
            Err(e) => return Err(e),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("[Extractor] yt-dlp failed: {}", stderr.trim());
            return Err(PipelineError::from_metadata_stderr(&stderr));
        }

        let item = parse_media_item(url, &output.stdout)?;
        info!(
            "[Extractor] '{}' ({}s) with {} encodings",
            item.title,
            item.duration_seconds,
            item.encodings.len()
        );
        Ok(item)
    }
}
