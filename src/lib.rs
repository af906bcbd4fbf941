pub mod config;
pub mod downloader;
pub mod logging;

pub use config::PipelineConfig;
pub use downloader::{Pipeline, PipelineError, PipelineState, ProgressEvent, TrimRequest};
