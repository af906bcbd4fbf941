// Helper functions shared by the pipeline stages

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};
use tracing::{debug, warn};

use super::errors::PipelineError;

/// Run command to completion, capturing stdout and stderr
pub async fn run_output(
    program: &str,
    args: &[String],
) -> Result<std::process::Output, PipelineError> {
    run_output_inner(program, args, None).await
}

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    timeout_secs: u64,
) -> Result<std::process::Output, PipelineError> {
    run_output_inner(program, args, Some(timeout_secs)).await
}

async fn run_output_inner(
    program: &str,
    args: &[String],
    timeout_secs: Option<u64>,
) -> Result<std::process::Output, PipelineError> {
    debug!("[Process] {} {}", program, args.join(" "));

    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Io(format!("Failed to capture stdout from {}", program)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| PipelineError::Io(format!("Failed to capture stderr from {}", program)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let status = match timeout_secs {
        Some(secs) => match timeout(TokioDuration::from_secs(secs), child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(PipelineError::Io(format!(
                    "{} timed out after {}s",
                    program, secs
                )));
            }
        },
        None => child.wait().await?,
    };

    let stdout = join_pipe(stdout_task, "stdout").await?;
    let stderr = join_pipe(stderr_task, "stderr").await?;
    Ok(std::process::Output {
        status,
        stdout,
        stderr,
    })
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, PipelineError> {
    task.await
        .map_err(|e| PipelineError::Io(format!("{} task failed: {}", name, e)))?
        .map_err(|e| PipelineError::Io(format!("Failed to read {}: {}", name, e)))
}

/// Map a spawn failure, keeping "binary missing" distinct
pub fn spawn_error(program: &str, e: std::io::Error) -> PipelineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PipelineError::ToolNotFound(program.to_string())
    } else {
        PipelineError::Io(format!("Failed to start {}: {}", program, e))
    }
}

/// Delete a superseded intermediate file. Failures are logged, never raised.
pub async fn remove_file_best_effort(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("[Cleanup] Removed {}", path.display()),
        Err(e) => warn!("[Cleanup] Could not remove {}: {}", path.display(), e),
    }
}

/// `<dir>/<stem><suffix>.<ext>`; keeps the original extension
pub fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Make a title usable as a file name on every platform
pub fn sanitize_file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// User download directory, else home, else the working directory
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .filter(|d| d.is_dir())
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}
