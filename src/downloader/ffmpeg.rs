// FFmpeg command builder and runner

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::errors::PipelineError;
use super::traits::{MediaTool, ToolOutput};
use super::utils::run_output;

/// Builder for FFmpeg argument lists.
///
/// Produces `[-y, -hide_banner, -loglevel, error, <input args>, -i, <in>,
/// <output args>, <out>]`.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments before -i
    input_args: Vec<String>,
    /// Arguments after -i
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek before the input. A zero offset is left out.
    pub fn seek(self, seconds: f64) -> Self {
        if seconds <= 0.0 {
            return self;
        }
        self.input_arg("-ss").input_arg(format_seconds(seconds))
    }

    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format_seconds(seconds))
    }

    /// Copy all streams verbatim
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-ab").output_arg(bitrate)
    }

    pub fn sample_rate(self, hz: u32) -> Self {
        self.output_arg("-ar").output_arg(hz.to_string())
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            // Overwrite leftovers instead of prompting on stdin
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Seconds with at most millisecond precision and no trailing zeros ("30", "12.5")
pub fn format_seconds(seconds: f64) -> String {
    let formatted = format!("{:.3}", seconds);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Runs the real ffmpeg binary
pub struct FfmpegTool {
    ffmpeg_path: String,
}

impl FfmpegTool {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Directory containing the binary, if the path has one (for yt-dlp's --ffmpeg-location)
    pub fn location(&self) -> Option<PathBuf> {
        Path::new(&self.ffmpeg_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn run(&self, args: &[String]) -> Result<ToolOutput, PipelineError> {
        let output = run_output(&self.ffmpeg_path, args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(
            "[ffmpeg] exit={:?} stderr_len={}",
            output.status.code(),
            stderr.len()
        );
        Ok(ToolOutput {
            success: output.status.success(),
            stderr,
        })
    }
}
