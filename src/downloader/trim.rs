// TrimEngine - stream-copy cut with a re-encode fallback

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::errors::PipelineError;
use super::ffmpeg::FfmpegCommand;
use super::time_range::{TimeRange, TrimRequest};
use super::traits::{MediaTool, ProgressEmitter};
use super::utils::{remove_file_best_effort, with_stem_suffix};
use crate::config::ReencodeSettings;

pub struct TrimEngine {
    tool: Arc<dyn MediaTool>,
    reencode: ReencodeSettings,
}

impl TrimEngine {
    pub fn new(tool: Arc<dyn MediaTool>, reencode: ReencodeSettings) -> Self {
        Self { tool, reencode }
    }

    /// Destination for a trimmed copy of `source`
    pub fn trimmed_path(source: &Path) -> PathBuf {
        with_stem_suffix(source, "_trimmed")
    }

    /// Lossless cut, constrained by keyframe alignment
    pub fn copy_command(&self, source: &Path, dest: &Path, range: TimeRange) -> FfmpegCommand {
        FfmpegCommand::new(source, dest)
            .seek(range.start())
            .duration(range.duration())
            .stream_copy()
    }

    /// Same bounds, transcoded to a known-compatible codec pair
    pub fn reencode_command(&self, source: &Path, dest: &Path, range: TimeRange) -> FfmpegCommand {
        FfmpegCommand::new(source, dest)
            .seek(range.start())
            .duration(range.duration())
            .audio_codec(&self.reencode.audio_codec)
            .video_codec(&self.reencode.video_codec)
    }

    /// Cut `source` to `trim` and return the new working file.
    ///
    /// `NoTrim` returns `source` untouched. The source is deleted only after a
    /// successful cut.
    pub async fn trim(
        &self,
        source: &Path,
        trim: TrimRequest,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError> {
        let Some(range) = trim.range() else {
            return Ok(source.to_path_buf());
        };

        let dest = Self::trimmed_path(source);
        progress.stage("trimming").await;
        info!(
            "[Trim] {} [{}s..{}s] -> {}",
            source.display(),
            range.start(),
            range.end(),
            dest.display()
        );

        let copy = self.tool.run(&self.copy_command(source, &dest, range).build_args()).await?;
        if !copy.success {
            warn!("[Trim] Stream copy failed, re-encoding: {}", copy.stderr);
            progress.stage("stream copy failed, re-encoding").await;

            let reencode = self
                .tool
                .run(&self.reencode_command(source, &dest, range).build_args())
                .await?;
            if !reencode.success {
                warn!("[Trim] Re-encode failed: {}", reencode.stderr);
                remove_file_best_effort(&dest).await;
                return Err(PipelineError::Trim(reencode.stderr));
            }
        }

        remove_file_best_effort(source).await;
        Ok(dest)
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

    /// Replays scripted exit results and records every argument list.
    /// Every run writes the output file (last argument), failed ones partially.
    struct ScriptedTool {
        results: Mutex<Vec<bool>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedTool {
        fn new(results: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MediaTool for ScriptedTool {
        async fn run(&self, args: &[String]) -> Result<ToolOutput, PipelineError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let success = self.results.lock().unwrap().remove(0);
            let contents: &[u8] = if success { b"trimmed" } else { b"partial" };
            std::fs::write(args.last().unwrap(), contents).unwrap();
            Ok(ToolOutput {
                success,
                stderr: if success { String::new() } else { format!("error #{}", args.len()) },
            })
        }
    }

    fn emitter() -> (ProgressEmitter, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (ProgressEmitter::new(tx), rx)
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[tokio::test]
    async fn no_trim_is_passthrough() {
        let tool = ScriptedTool::new(vec![]);
        let engine = TrimEngine::new(tool.clone(), ReencodeSettings::default());
        let (progress, _rx) = emitter();

        let out = engine
            .trim(Path::new("/tmp/a.mp4"), TrimRequest::NoTrim, &progress)
            .await
            .unwrap();
        assert_eq!(out, PathBuf::from("/tmp/a.mp4"));
        assert!(tool.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_copy_success_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"full").unwrap();

        let tool = ScriptedTool::new(vec![true]);
        let engine = TrimEngine::new(tool.clone(), ReencodeSettings::default());
        let (progress, _rx) = emitter();
        let range = TimeRange::new(30.0, 90.0).unwrap();

        let out = engine.trim(&source, TrimRequest::Range(range), &progress).await.unwrap();

        assert_eq!(out, dir.path().join("clip_trimmed.mp4"));
        assert!(out.exists());
        assert!(!source.exists());

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(arg_after(&calls[0], "-ss"), Some("30"));
        assert_eq!(arg_after(&calls[0], "-t"), Some("60"));
        assert_eq!(arg_after(&calls[0], "-c"), Some("copy"));
    }

    #[tokio::test]
    async fn falls_back_to_reencode_with_same_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        std::fs::write(&source, b"full").unwrap();

        let tool = ScriptedTool::new(vec![false, true]);
        let engine = TrimEngine::new(tool.clone(), ReencodeSettings::default());
        let (progress, _rx) = emitter();
        let range = TimeRange::new(0.0, 12.5).unwrap();

        let out = engine.trim(&source, TrimRequest::Range(range), &progress).await.unwrap();
        assert_eq!(out, dir.path().join("clip_trimmed.webm"));
        assert!(!source.exists());

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for call in calls.iter() {
            assert_eq!(arg_after(call, "-ss"), None);
            assert_eq!(arg_after(call, "-t"), Some("12.5"));
        }
        assert_eq!(arg_after(&calls[1], "-c:a"), Some("aac"));
        assert_eq!(arg_after(&calls[1], "-c:v"), Some("libx264"));
    }

    #[tokio::test]
    async fn double_failure_keeps_source_and_reports_fallback_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"full").unwrap();

        let tool = ScriptedTool::new(vec![false, false]);
        let engine = TrimEngine::new(tool.clone(), ReencodeSettings::default());
        let (progress, _rx) = emitter();
        let range = TimeRange::new(5.0, 10.0).unwrap();

        let err = engine
            .trim(&source, TrimRequest::Range(range), &progress)
            .await
            .unwrap_err();

        // Diagnostic comes from the second (re-encode) run
        let reencode_len = tool.calls.lock().unwrap()[1].len();
        match err {
            PipelineError::Trim(msg) => assert_eq!(msg, format!("error #{}", reencode_len)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(std::fs::read(&source).unwrap(), b"full");
        assert!(!dir.path().join("clip_trimmed.mp4").exists());
    }
}
