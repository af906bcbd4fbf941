// Pipeline - composition root sequencing Fetch → Select → Download → Trim → Extract
//
// Owns the per-instance state that a window would otherwise keep in fields:
// the fetched item, its catalog, the current state and the one-job guard.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::audio::AudioExtractor;
use super::errors::PipelineError;
use super::extractor::YtDlpMetadataSource;
use super::ffmpeg::FfmpegTool;
use super::format_catalog::FormatCatalog;
use super::models::{DownloadJob, FormatKind, MediaItem, ProgressEvent, SelectableFormat};
use super::orchestrator::DownloadOrchestrator;
use super::time_range::TrimRequest;
use super::tools::{ToolManager, ToolType};
use super::traits::{MediaTool, MediaTransport, MetadataSource, ProgressEmitter};
use super::transport::YtDlpTransport;
use super::trim::TrimEngine;
use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Fetching,
    /// The only state waiting on the caller (format + range)
    AwaitingSelection,
    Downloading,
    Trimming,
    Extracting,
    Done,
    Failed,
}

#[derive(Debug)]
struct Shared {
    state: PipelineState,
    item: Option<MediaItem>,
    catalog: FormatCatalog,
    /// A fetch or download worker is in flight
    busy: bool,
}

impl Shared {
    fn finish_job(&mut self, ok: bool) {
        self.busy = false;
        self.state = if ok {
            PipelineState::Done
        } else {
            PipelineState::Failed
        };
    }
}

/// Stages a download worker needs, shared with every spawned job
struct Stages {
    orchestrator: DownloadOrchestrator,
    trimmer: TrimEngine,
    extractor: AudioExtractor,
}

/// Awaitable result of a background fetch
pub struct FetchHandle {
    handle: JoinHandle<Result<Vec<SelectableFormat>, PipelineError>>,
}

impl FetchHandle {
    /// Wait for the fetch worker and return the selectable formats
    pub async fn wait(self) -> Result<Vec<SelectableFormat>, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Io(format!("fetch worker failed: {}", e)))?
    }
}

pub struct Pipeline {
    source: Arc<dyn MetadataSource>,
    stages: Arc<Stages>,
    output_dir: PathBuf,
    filename_template: String,
    event_capacity: usize,
    shared: Arc<Mutex<Shared>>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        transport: Arc<dyn MediaTransport>,
        tool: Arc<dyn MediaTool>,
        config: &PipelineConfig,
    ) -> Self {
        let stages = Stages {
            orchestrator: DownloadOrchestrator::new(transport),
            trimmer: TrimEngine::new(tool.clone(), config.reencode.clone()),
            extractor: AudioExtractor::new(tool, config.audio.clone()),
        };

        Self {
            source,
            stages: Arc::new(stages),
            output_dir: config.resolved_output_dir(),
            filename_template: config.filename_template.clone(),
            event_capacity: config.event_capacity.max(1),
            shared: Arc::new(Mutex::new(Shared {
                state: PipelineState::Idle,
                item: None,
                catalog: FormatCatalog::default(),
                busy: false,
            })),
        }
    }

    /// Pipeline backed by the real yt-dlp and ffmpeg binaries
    pub fn from_config(config: &PipelineConfig) -> Self {
        let tools = ToolManager::new();
        let ytdlp = tools.resolve(ToolType::YtDlp, config.ytdlp_path.as_deref());
        let ffmpeg_path = tools.resolve(ToolType::Ffmpeg, config.ffmpeg_path.as_deref());
        let ffmpeg = FfmpegTool::new(ffmpeg_path);
        info!("[Pipeline] yt-dlp={} ffmpeg location={:?}", ytdlp, ffmpeg.location());

        let source = Arc::new(YtDlpMetadataSource::new(ytdlp.clone(), config));
        let transport = Arc::new(YtDlpTransport::new(ytdlp, ffmpeg.location(), config));
        Self::new(source, transport, Arc::new(ffmpeg), config)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// The item of the last successful fetch
    pub fn media_item(&self) -> Option<MediaItem> {
        self.lock().item.clone()
    }

    /// Selectable formats of the last successful fetch, in display order
    pub fn list_formats(&self) -> Vec<SelectableFormat> {
        self.lock().catalog.formats().to_vec()
    }

    /// Query metadata on a background worker.
    ///
    /// Rejected with `Busy` while any job is in flight.
    pub fn start_fetch(&self, url: &str) -> Result<FetchHandle, PipelineError> {
        {
            let mut shared = self.lock();
            if shared.busy {
                return Err(PipelineError::Busy);
            }
            shared.busy = true;
            shared.state = PipelineState::Fetching;
            shared.item = None;
            shared.catalog = FormatCatalog::default();
        }

        let source = self.source.clone();
        let shared = self.shared.clone();
        let url = url.trim().to_string();

        let handle = tokio::spawn(async move {
            info!("[Pipeline] Fetching {} via {}", url, source.name());
            // Inner task so a panicking source still releases the guard
            let fetch = tokio::spawn(async move { source.fetch(&url).await });
            let result = fetch.await.unwrap_or_else(|e| {
                Err(PipelineError::Io(format!("fetch worker failed: {}", e)))
            });

            let mut guard = lock_shared(&shared);
            guard.busy = false;
            match result {
                Ok(item) => {
                    let catalog = FormatCatalog::build(&item.encodings);
                    info!("[Pipeline] {} selectable formats", catalog.len());
                    guard.item = Some(item);
                    if catalog.is_empty() {
                        guard.state = PipelineState::Failed;
                        return Err(PipelineError::NoFormatsAvailable);
                    }
                    let formats = catalog.formats().to_vec();
                    guard.catalog = catalog;
                    guard.state = PipelineState::AwaitingSelection;
                    Ok(formats)
                }
                Err(e) => {
                    warn!("[Pipeline] Fetch failed: {}", e);
                    guard.state = PipelineState::Failed;
                    Err(e)
                }
            }
        });

        Ok(FetchHandle { handle })
    }

    /// Download the chosen format on a background worker, then trim and
    /// extract as requested.
    ///
    /// The returned stream ends with exactly one `Done` or `Failed` event.
    pub fn start_download(
        &self,
        format_id: &str,
        trim: TrimRequest,
    ) -> Result<mpsc::Receiver<ProgressEvent>, PipelineError> {
        let job = {
            let mut shared = self.lock();
            if shared.busy {
                return Err(PipelineError::Busy);
            }
            let item = match &shared.item {
                Some(item) if !shared.catalog.is_empty() => item,
                _ => return Err(PipelineError::NotReady),
            };
            let format = shared
                .catalog
                .find(format_id)
                .cloned()
                .ok_or_else(|| PipelineError::UnknownFormat(format_id.to_string()))?;
            let trim = match trim {
                TrimRequest::NoTrim => TrimRequest::NoTrim,
                TrimRequest::Range(range) => {
                    TrimRequest::Range(range.clamp_to(item.duration_seconds)?)
                }
            };

            let job = DownloadJob {
                url: item.url.clone(),
                title: item.title.clone(),
                format,
                trim,
                output_dir: self.output_dir.clone(),
                filename_template: self.filename_template.clone(),
            };
            shared.busy = true;
            shared.state = PipelineState::Downloading;
            job
        };

        let (tx, rx) = mpsc::channel(self.event_capacity);
        let emitter = ProgressEmitter::new(tx);
        let stages = self.stages.clone();
        let shared = self.shared.clone();

        tokio::spawn(async move {
            // Inner task so a panicking stage still ends with `Failed`
            let worker = {
                let (shared, emitter) = (shared.clone(), emitter.clone());
                tokio::spawn(async move { run_job(&job, &stages, &shared, &emitter).await })
            };
            let result = worker.await.unwrap_or_else(|e| {
                Err(PipelineError::Io(format!("download worker failed: {}", e)))
            });

            let event = match result {
                Ok(path) => {
                    info!("[Pipeline] Done: {}", path.display());
                    lock_shared(&shared).finish_job(true);
                    ProgressEvent::Done(path)
                }
                Err(e) => {
                    warn!("[Pipeline] Job failed: {}", e);
                    lock_shared(&shared).finish_job(false);
                    ProgressEvent::Failed(e)
                }
            };
            emitter.emit(event).await;
        });

        Ok(rx)
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panicked worker must not wedge the pipeline
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

fn set_state(shared: &Mutex<Shared>, state: PipelineState) {
    lock_shared(shared).state = state;
}

async fn run_job(
    job: &DownloadJob,
    stages: &Stages,
    shared: &Mutex<Shared>,
    emitter: &ProgressEmitter,
) -> Result<PathBuf, PipelineError> {
    tokio::fs::create_dir_all(&job.output_dir).await?;

    let downloaded = stages
        .orchestrator
        .download(
            &job.url,
            &job.title,
            &job.format,
            &job.output_dir,
            &job.filename_template,
            emitter,
        )
        .await?;

    if job.trim.range().is_some() {
        set_state(shared, PipelineState::Trimming);
    }
    let working = stages.trimmer.trim(&downloaded, job.trim, emitter).await?;

    if job.format.kind == FormatKind::Audio {
        set_state(shared, PipelineState::Extracting);
    }
    stages.extractor.extract(&working, job.format.kind, emitter).await
}
