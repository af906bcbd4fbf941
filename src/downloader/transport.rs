// yt-dlp transport - downloads one selector with real-time progress streaming

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use super::errors::PipelineError;
use super::models::ProgressEvent;
use super::traits::{MediaTransport, ProgressEmitter};
use super::utils::spawn_error;
use crate::config::PipelineConfig;

/// Prefix of the line yt-dlp prints with the final file path
const FILEPATH_MARKER: &str = "[filepath] ";

/// One parsed line of yt-dlp output
#[derive(Debug, Clone, PartialEq)]
pub enum TransportLine {
    Progress { percent: f32, speed: String, eta: String },
    Merging,
    FinalPath(PathBuf),
}

/// Parse yt-dlp output lines like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
pub fn parse_transport_line(line: &str) -> Option<TransportLine> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(concat!(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*\S+",
            r"(?:\s+at\s+(\S+(?:\s*\S+/s)?))?(?:\s+ETA\s+(\S+))?"
        ))
        .unwrap();
        static ref MERGE_RE: Regex = Regex::new(r"\[Merger?\]\s+Merging").unwrap();
    }

    if let Some(path) = line.strip_prefix(FILEPATH_MARKER) {
        let path = path.trim();
        if !path.is_empty() {
            return Some(TransportLine::FinalPath(PathBuf::from(path)));
        }
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let speed = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let eta = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        return Some(TransportLine::Progress {
            percent: percent.clamp(0.0, 100.0),
            speed: speed.to_string(),
            eta: eta.to_string(),
        });
    }

    if MERGE_RE.is_match(line) {
        return Some(TransportLine::Merging);
    }

    None
}

pub struct YtDlpTransport {
    ytdlp_path: String,
    ffmpeg_location: Option<PathBuf>,
    proxy: Option<String>,
    socket_timeout_secs: u32,
    check_certificates: bool,
}

impl YtDlpTransport {
    pub fn new(
        ytdlp_path: impl Into<String>,
        ffmpeg_location: Option<PathBuf>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffmpeg_location,
            proxy: config.proxy.clone(),
            socket_timeout_secs: config.socket_timeout_secs,
            check_certificates: config.check_certificates,
        }
    }

    fn build_args(&self, url: &str, selector: &str, output_template: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            selector.to_string(),
            "-o".to_string(),
            output_template.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            // Make merged output predictable
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            // Final path after merge/move, on stdout
            "--print".to_string(),
            format!("after_move:{}%(filepath)s", FILEPATH_MARKER),
            // --print implies --quiet; keep the progress lines
            "--progress".to_string(),
        ];

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().to_string());
        }

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

#[async_trait]
impl MediaTransport for YtDlpTransport {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        url: &str,
        selector: &str,
        output_template: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError> {
        let args = self.build_args(url, selector, output_template);
        info!("[Transport] Starting yt-dlp with selector '{}'", selector);
        debug!("[Transport] {} {}", self.ytdlp_path, args.join(" "));

        // Spawn process with piped stdout for real-time progress
        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.ytdlp_path, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Io("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| PipelineError::Io("Failed to capture stderr".to_string()))?;

        // --print makes yt-dlp quiet, which moves progress lines to stderr;
        // read both streams and keep the non-progress stderr as diagnostics.
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);
        let mut diagnostics: Vec<String> = Vec::new();
        let mut final_path = None;

        while out_open || err_open {
            let (line, from_stderr) = tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => (line, false),
                    None => {
                        out_open = false;
                        continue;
                    }
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => (line, true),
                    None => {
                        err_open = false;
                        continue;
                    }
                },
            };

            match parse_transport_line(&line) {
                Some(TransportLine::Progress { percent, speed, eta }) => {
                    progress
                        .emit(ProgressEvent::Downloading {
                            percent,
                            speed,
                            eta,
                        })
                        .await;
                }
                Some(TransportLine::Merging) => {
                    debug!("[yt-dlp] {}", line);
                    progress.stage("merging video and audio").await;
                }
                Some(TransportLine::FinalPath(path)) => {
                    debug!("[Transport] Reported path {}", path.display());
                    final_path = Some(path);
                }
                None if from_stderr && !line.trim().is_empty() => diagnostics.push(line),
                None => {}
            }
        }

        let status = child.wait().await?;

        if !status.success() {
            let stderr_output = diagnostics.join("\n");
            warn!("[Transport] yt-dlp exited with {:?}: {}", status.code(), stderr_output);
            let lower = stderr_output.to_lowercase();
            if lower.contains("merg") || lower.contains("ffmpeg") {
                return Err(PipelineError::Transport(format!(
                    "merging video and audio failed: {}",
                    stderr_output
                )));
            }
            return Err(PipelineError::Transport(stderr_output));
        }

        // Nothing printed: hand back the template, the orchestrator resolves it
        Ok(final_path.unwrap_or_else(|| output_template.to_path_buf()))
    }
}
