// AudioExtractor - converts the working file into a standalone audio file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::errors::PipelineError;
use super::ffmpeg::FfmpegCommand;
use super::models::FormatKind;
use super::traits::{MediaTool, ProgressEmitter};
use super::utils::{remove_file_best_effort, with_stem_suffix};
use crate::config::AudioSettings;

pub struct AudioExtractor {
    tool: Arc<dyn MediaTool>,
    settings: AudioSettings,
}

impl AudioExtractor {
    pub fn new(tool: Arc<dyn MediaTool>, settings: AudioSettings) -> Self {
        Self { tool, settings }
    }

    /// Input with its extension replaced by the audio container.
    /// Never equal to the input.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let container = self.settings.container.as_str();
        let same_ext = input
            .extension()
            .map_or(false, |e| e.to_string_lossy().eq_ignore_ascii_case(container));
        if same_ext {
            with_stem_suffix(input, "_audio")
        } else {
            input.with_extension(container)
        }
    }

    pub fn command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, output)
            .no_video()
            .audio_bitrate(&self.settings.bitrate)
            .sample_rate(self.settings.sample_rate)
    }

    /// Re-encode `input`'s audio when the selection was audio-only.
    ///
    /// On failure the input stays on disk.
    pub async fn extract(
        &self,
        input: &Path,
        kind: FormatKind,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError> {
        if kind != FormatKind::Audio {
            return Ok(input.to_path_buf());
        }

        let output = self.output_path(input);
        progress
            .stage(format!("extracting audio to {}", self.settings.container))
            .await;
        info!("[Audio] {} -> {}", input.display(), output.display());

        let result = self.tool.run(&self.command(input, &output).build_args()).await?;
        if !result.success {
            warn!("[Audio] Extraction failed: {}", result.stderr);
            return Err(PipelineError::Extraction(result.stderr));
        }

        if output != input {
            remove_file_best_effort(input).await;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::ProgressEvent;
    use crate::downloader::traits::ToolOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingTool {
        succeed: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl MediaTool for RecordingTool {
        async fn run(&self, args: &[String]) -> Result<ToolOutput, PipelineError> {
            self.calls.lock().unwrap().push(args.to_vec());
            if self.succeed {
                std::fs::write(args.last().unwrap(), b"audio").unwrap();
            }
            Ok(ToolOutput {
                success: self.succeed,
                stderr: if self.succeed { String::new() } else { "Invalid data found".into() },
            })
        }
    }

    fn setup(succeed: bool) -> (Arc<RecordingTool>, AudioExtractor) {
        let tool = Arc::new(RecordingTool {
            succeed,
            calls: Mutex::new(Vec::new()),
        });
        let extractor = AudioExtractor::new(tool.clone(), AudioSettings::default());
        (tool, extractor)
    }

    fn emitter() -> (ProgressEmitter, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (ProgressEmitter::new(tx), rx)
    }

    #[tokio::test]
    async fn video_selection_is_passthrough() {
        let (tool, extractor) = setup(true);
        let (progress, _rx) = emitter();
        let out = extractor
            .extract(Path::new("/tmp/v.mp4"), FormatKind::Video, &progress)
            .await
            .unwrap();
        assert_eq!(out, PathBuf::from("/tmp/v.mp4"));
        assert!(tool.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn audio_selection_converts_and_removes_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.m4a");
        std::fs::write(&input, b"m4a").unwrap();
        let (tool, extractor) = setup(true);
        let (progress, _rx) = emitter();

        let out = extractor.extract(&input, FormatKind::Audio, &progress).await.unwrap();

        assert_eq!(out, dir.path().join("song.mp3"));
        assert!(out.exists());
        assert!(!input.exists());

        let calls = tool.calls.lock().unwrap();
        let expected: Vec<String> = [
            "-y", "-hide_banner", "-loglevel", "error", "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([input.to_string_lossy().to_string()])
        .chain(["-vn", "-ab", "192k", "-ar", "44100"].iter().map(|s| s.to_string()))
        .chain([out.to_string_lossy().to_string()])
        .collect();
        assert_eq!(calls[0], expected);
    }

    #[tokio::test]
    async fn failure_keeps_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.webm");
        std::fs::write(&input, b"webm").unwrap();
        let (_tool, extractor) = setup(false);
        let (progress, _rx) = emitter();

        let err = extractor.extract(&input, FormatKind::Audio, &progress).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ref msg) if msg == "Invalid data found"));
        assert!(input.exists());
    }

    #[test]
    fn output_never_collides_with_input() {
        let (_tool, extractor) = setup(true);
        assert_eq!(
            extractor.output_path(Path::new("/tmp/a.mp3")),
            PathBuf::from("/tmp/a_audio.mp3")
        );
        assert_eq!(
            extractor.output_path(Path::new("/tmp/a_trimmed.m4a")),
            PathBuf::from("/tmp/a_trimmed.mp3")
        );
    }
}
