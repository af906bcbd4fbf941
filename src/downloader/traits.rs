// Seams to the external collaborators: metadata source, transport, media tool

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::errors::PipelineError;
use super::models::{MediaItem, ProgressEvent};

/// Queries the remote source for an item's metadata. Never downloads media.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<MediaItem, PipelineError>;
}

/// Moves the bytes of one encoding to disk
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Name of the transport (for logging)
    fn name(&self) -> &'static str;

    /// Download `selector` into `output_template`, reporting progress.
    ///
    /// Returns the path the transport believes it wrote; callers must not
    /// assume that file exists.
    async fn download(
        &self,
        url: &str,
        selector: &str,
        output_template: &Path,
        progress: &ProgressEmitter,
    ) -> Result<PathBuf, PipelineError>;
}

/// Result of one media tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stderr: String,
}

/// The external media-processing tool, run as a subprocess
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<ToolOutput, PipelineError>;
}

/// Progress emitter helper
#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Waits for channel capacity so events are never dropped or reordered.
    /// A consumer that went away is ignored; the job keeps running.
    pub async fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event).await;
    }

    pub async fn stage(&self, description: impl Into<String>) {
        self.emit(ProgressEvent::stage(description)).await;
    }
}
