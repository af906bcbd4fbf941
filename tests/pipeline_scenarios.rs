// End-to-end pipeline runs against fake metadata, transport and media tool

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clip_grabber_lib::config::PipelineConfig;
use clip_grabber_lib::downloader::{
    EncodingDescriptor, MediaItem, MediaTool, MediaTransport, MetadataSource, Pipeline,
    PipelineError, PipelineState, ProgressEmitter, ProgressEvent, TimeRange, ToolOutput,
    TrimRequest,
};

struct FakeSource {
    duration_seconds: u64,
    encodings: Vec<EncodingDescriptor>,
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch(&self, url: &str) -> Result<MediaItem, PipelineError> {
        Ok(MediaItem {
            url: url.to_string(),
            id: "abc123".into(),
            title: "Scenario".into(),
            uploader: "tester".into(),
            duration_seconds: self.duration_seconds,
            encodings: self.encodings.clone(),
        })
    }
}

/// Writes `Scenario.<ext>` next to the template, or fails with `error`
struct FakeTransport {
    ext: &'static str,
    error: Option<PipelineError>,
    selectors: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaTransport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn download(
        &self,
        _url: &str,
        selector: &str,
        output_template: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError> {
        self.selectors.lock().unwrap().push(selector.to_string());
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        for percent in [10.0, 55.5, 100.0] {
            progress
                .emit(ProgressEvent::Downloading {
                    percent,
                    speed: "2.00MiB/s".into(),
                    eta: "00:03".into(),
                })
                .await;
        }
        let path = output_template.with_file_name(format!("Scenario.{}", self.ext));
        std::fs::write(&path, b"media").unwrap();
        Ok(path)
    }
}

/// Records every argument list; writes the output file when succeeding
struct FakeTool {
    succeed: bool,
    calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn run(&self, args: &[String]) -> Result<ToolOutput, PipelineError> {
        self.calls.lock().unwrap().push(args.to_vec());
        if self.succeed {
            std::fs::write(args.last().unwrap(), b"processed").unwrap();
        }
        Ok(ToolOutput {
            success: self.succeed,
            stderr: if self.succeed { String::new() } else { "Conversion failed!".into() },
        })
    }
}

fn encoding(
    id: &str,
    ext: &str,
    video: bool,
    audio: bool,
    height: Option<u32>,
) -> EncodingDescriptor {
    EncodingDescriptor {
        format_id: id.into(),
        ext: ext.into(),
        has_video: video,
        has_audio: audio,
        height,
        resolution_note: height.map(|h| format!("{}p", h)),
        bitrate_kbps: if audio && !video { Some(128.0) } else { None },
        filesize: Some(5_000_000),
        filesize_approx: None,
    }
}

struct Harness {
    pipeline: Pipeline,
    transport: Arc<FakeTransport>,
    tool: Arc<FakeTool>,
    dir: tempfile::TempDir,
}

fn harness(
    ext: &'static str,
    transport_error: Option<PipelineError>,
    tool_succeeds: bool,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(FakeSource {
        duration_seconds: 600,
        encodings: vec![
            encoding("137", "mp4", true, false, Some(1080)),
            encoding("140", "m4a", false, true, None),
        ],
    });
    let transport = Arc::new(FakeTransport {
        ext,
        error: transport_error,
        selectors: Mutex::new(Vec::new()),
    });
    let tool = Arc::new(FakeTool {
        succeed: tool_succeeds,
        calls: Mutex::new(Vec::new()),
    });
    let config = PipelineConfig::default().with_output_dir(Some(dir.path().to_path_buf()));
    let pipeline = Pipeline::new(source, transport.clone(), tool.clone(), &config);
    Harness {
        pipeline,
        transport,
        tool,
        dir,
    }
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn assert_single_terminal(events: &[ProgressEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "{:?}", events);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn video_without_audio_is_merged_then_trimmed() {
    let h = harness("mp4", None, true);
    let formats = h
        .pipeline
        .start_fetch("https://example.com/watch")
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(formats[0].format_id, "137");
    assert!(!formats[0].has_embedded_audio);

    let range = TimeRange::new(30.0, 90.0).unwrap();
    let rx = h.pipeline.start_download("137", TrimRequest::Range(range)).unwrap();
    let events = collect(rx).await;

    assert_eq!(h.transport.selectors.lock().unwrap().as_slice(), ["137+bestaudio"]);

    let calls = h.tool.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(arg_after(&calls[0], "-ss"), Some("30"));
    assert_eq!(arg_after(&calls[0], "-t"), Some("60"));
    assert_eq!(arg_after(&calls[0], "-c"), Some("copy"));

    assert_single_terminal(&events);
    let trimmed = h.dir.path().join("Scenario_trimmed.mp4");
    match events.last() {
        Some(ProgressEvent::Done(path)) => assert_eq!(path, &trimmed),
        other => panic!("unexpected {:?}", other),
    }
    assert!(trimmed.exists());
    assert!(!h.dir.path().join("Scenario.mp4").exists());
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::Stage(s) if s == "trimming")));
    assert_eq!(h.pipeline.state(), PipelineState::Done);
}

#[tokio::test]
async fn audio_selection_skips_trim_and_extracts() {
    let h = harness("m4a", None, true);
    h.pipeline.start_fetch("https://example.com/watch").unwrap().wait().await.unwrap();

    let rx = h.pipeline.start_download("140", TrimRequest::NoTrim).unwrap();
    let events = collect(rx).await;

    assert_eq!(h.transport.selectors.lock().unwrap().as_slice(), ["140"]);
    let calls = h.tool.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].iter().any(|a| a == "-vn"));
    assert!(!calls[0].iter().any(|a| a == "-ss" || a == "-t"));

    assert_single_terminal(&events);
    let intermediate = h.dir.path().join("Scenario.m4a");
    match events.last() {
        Some(ProgressEvent::Done(path)) => {
            assert_eq!(path, &h.dir.path().join("Scenario.mp3"));
            assert_ne!(path, &intermediate);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!intermediate.exists());
}

#[tokio::test]
async fn progress_percent_never_decreases() {
    let h = harness("mp4", None, true);
    h.pipeline.start_fetch("u").unwrap().wait().await.unwrap();
    let events = collect(h.pipeline.start_download("137", TrimRequest::NoTrim).unwrap()).await;

    let percents: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Downloading { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.len(), 3);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(h.tool.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transport_failure_ends_with_one_failed_event() {
    let h = harness(
        "mp4",
        Some(PipelineError::Transport("HTTP Error 403: Forbidden".into())),
        true,
    );
    h.pipeline.start_fetch("u").unwrap().wait().await.unwrap();

    let events = collect(h.pipeline.start_download("137", TrimRequest::NoTrim).unwrap()).await;

    assert_single_terminal(&events);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Failed(PipelineError::Transport(msg))) if msg.contains("403")
    ));
    assert_eq!(h.pipeline.state(), PipelineState::Failed);
    assert!(h.tool.calls.lock().unwrap().is_empty());

    // The catalog survives for a retry
    assert!(h.pipeline.start_download("140", TrimRequest::NoTrim).is_ok());
}

#[tokio::test]
async fn failed_trim_keeps_the_download() {
    let h = harness("mp4", None, false);
    h.pipeline.start_fetch("u").unwrap().wait().await.unwrap();

    let range = TimeRange::new(10.0, 20.0).unwrap();
    let rx = h.pipeline.start_download("137", TrimRequest::Range(range)).unwrap();
    let events = collect(rx).await;

    assert_single_terminal(&events);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Failed(PipelineError::Trim(msg))) if msg == "Conversion failed!"
    ));
    // Copy and re-encode were both attempted
    assert_eq!(h.tool.calls.lock().unwrap().len(), 2);
    assert!(h.dir.path().join("Scenario.mp4").exists());
}

#[tokio::test]
async fn range_end_is_clamped_to_duration() {
    let h = harness("mp4", None, true);
    h.pipeline.start_fetch("u").unwrap().wait().await.unwrap();

    let range = TimeRange::new(590.0, 900.0).unwrap();
    let rx = h.pipeline.start_download("137", TrimRequest::Range(range)).unwrap();
    let events = collect(rx).await;

    assert!(matches!(events.last(), Some(ProgressEvent::Done(_))));
    let calls = h.tool.calls.lock().unwrap();
    assert_eq!(arg_after(&calls[0], "-ss"), Some("590"));
    assert_eq!(arg_after(&calls[0], "-t"), Some("10"));
}
