// Downloader module - metadata, selection, transfer and post-processing stages

pub mod audio;
pub mod errors;
pub mod extractor;
pub mod ffmpeg;
pub mod format_catalog;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod time_range;
pub mod tools;
pub mod traits;
pub mod transport;
pub mod trim;
pub mod utils;

pub use audio::AudioExtractor;
pub use errors::{ErrorKind, MetadataErrorKind, PipelineError};
pub use extractor::YtDlpMetadataSource;
pub use ffmpeg::{FfmpegCommand, FfmpegTool};
pub use format_catalog::FormatCatalog;
pub use models::{
    DownloadJob, EncodingDescriptor, FormatKind, MediaItem, ProgressEvent, SelectableFormat,
};
pub use orchestrator::DownloadOrchestrator;
pub use pipeline::{FetchHandle, Pipeline, PipelineState};
pub use time_range::{format_hms, parse_time_text, TimeRange, TrimRequest};
pub use tools::{ToolInfo, ToolManager, ToolType};
pub use traits::{MediaTool, MediaTransport, MetadataSource, ProgressEmitter, ToolOutput};
pub use transport::YtDlpTransport;
pub use trim::TrimEngine;
