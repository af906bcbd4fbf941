// Pipeline configuration: defaults, environment overrides, builder setters

use std::path::PathBuf;

use crate::downloader::utils::default_output_dir;

pub const ENV_YTDLP: &str = "CLIP_GRABBER_YTDLP";
pub const ENV_FFMPEG: &str = "CLIP_GRABBER_FFMPEG";
pub const ENV_OUTPUT_DIR: &str = "CLIP_GRABBER_OUTPUT_DIR";
pub const ENV_PROXY: &str = "CLIP_GRABBER_PROXY";

/// Fixed-quality settings for audio extraction
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    /// Output container / extension
    pub container: String,
    /// Constant bitrate passed as `-ab`
    pub bitrate: String,
    /// Sample rate in Hz passed as `-ar`
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            container: "mp3".to_string(),
            bitrate: "192k".to_string(),
            sample_rate: 44_100,
        }
    }
}

/// Codec pair used when a stream-copy cut fails
#[derive(Debug, Clone, PartialEq)]
pub struct ReencodeSettings {
    pub audio_codec: String,
    pub video_codec: String,
}

impl Default for ReencodeSettings {
    fn default() -> Self {
        Self {
            audio_codec: "aac".to_string(),
            video_codec: "libx264".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// yt-dlp binary; auto-detected when None
    pub ytdlp_path: Option<String>,
    /// ffmpeg binary; auto-detected when None
    pub ffmpeg_path: Option<String>,
    /// Target directory; user download dir (or home) when None
    pub output_dir: Option<PathBuf>,
    /// yt-dlp output template, relative to the output directory
    pub filename_template: String,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Passed to yt-dlp as --socket-timeout
    pub socket_timeout_secs: u32,
    /// Upper bound for the metadata query subprocess
    pub metadata_timeout_secs: u64,
    pub check_certificates: bool,
    /// Capacity of the progress event channel
    pub event_capacity: usize,
    pub audio: AudioSettings,
    pub reencode: ReencodeSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            output_dir: None,
            filename_template: "%(title)s.%(ext)s".to_string(),
            proxy: None,
            socket_timeout_secs: 30,
            metadata_timeout_secs: 60,
            check_certificates: false,
            event_capacity: 64,
            audio: AudioSettings::default(),
            reencode: ReencodeSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value lookup (environment in production)
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = non_empty(ENV_YTDLP) {
            self.ytdlp_path = Some(path);
        }
        if let Some(path) = non_empty(ENV_FFMPEG) {
            self.ffmpeg_path = Some(path);
        }
        if let Some(dir) = non_empty(ENV_OUTPUT_DIR) {
            self.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(proxy) = non_empty(ENV_PROXY) {
            self.proxy = Some(proxy);
        }
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.ytdlp_path = path;
        }
        self
    }

    pub fn with_ffmpeg_path(mut self, path: Option<String>) -> Self {
        if path.is_some() {
            self.ffmpeg_path = path;
        }
        self
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if dir.is_some() {
            self.output_dir = dir;
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.proxy = proxy;
        }
        self
    }

    pub fn with_audio(mut self, audio: AudioSettings) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }
}
