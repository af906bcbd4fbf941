// clip-grabber - command-line front end for the download pipeline

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use clip_grabber_lib::config::PipelineConfig;
use clip_grabber_lib::downloader::{
    format_hms, Pipeline, ProgressEvent, SelectableFormat, ToolManager, ToolType, TrimRequest,
};
use clip_grabber_lib::logging;

#[derive(Parser, Debug)]
#[command(name = "clip-grabber", version, about = "Download, trim and convert online videos")]
struct Cli {
    /// Path to the yt-dlp binary
    #[arg(long, global = true)]
    ytdlp: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long, global = true)]
    ffmpeg: Option<String>,

    /// Proxy URL handed to yt-dlp
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the selectable formats of a video
    Formats { url: String },

    /// Download one format, optionally trimmed
    Download {
        url: String,

        /// Format id, or index in the `formats` listing
        #[arg(short, long)]
        format: String,

        /// Trim start (SS, MM:SS or HH:MM:SS)
        #[arg(long)]
        start: Option<String>,

        /// Trim end (SS, MM:SS or HH:MM:SS)
        #[arg(long)]
        end: Option<String>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show where yt-dlp and ffmpeg were found
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = PipelineConfig::from_env()
        .with_ytdlp_path(cli.ytdlp)
        .with_ffmpeg_path(cli.ffmpeg)
        .with_proxy(cli.proxy);

    match cli.command {
        Command::Formats { url } => list_formats(config, &url).await,
        Command::Download {
            url,
            format,
            start,
            end,
            output_dir,
        } => {
            let config = config.with_output_dir(output_dir);
            download(config, &url, &format, start.as_deref(), end.as_deref()).await
        }
        Command::Tools => {
            show_tools(&config);
            Ok(())
        }
    }
}

async fn fetch(pipeline: &Pipeline, url: &str) -> Result<Vec<SelectableFormat>> {
    let formats = pipeline
        .start_fetch(url)?
        .wait()
        .await
        .with_context(|| format!("could not fetch {}", url))?;

    if let Some(item) = pipeline.media_item() {
        println!("{}", item.title);
        if !item.uploader.is_empty() {
            println!("by {}", item.uploader);
        }
        if item.duration_seconds > 0 {
            println!("duration {}", format_hms(item.duration_seconds as f64));
        }
    }
    Ok(formats)
}

async fn list_formats(config: PipelineConfig, url: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(&config);
    let formats = fetch(&pipeline, url).await?;

    println!();
    for (index, format) in formats.iter().enumerate() {
        println!("{:>3}  {:<8} {}", index, format.format_id, format.label);
    }
    Ok(())
}

/// Exact format id first; a bare number that is not an id is an index
fn pick_format<'a>(formats: &'a [SelectableFormat], choice: &str) -> Option<&'a SelectableFormat> {
    formats.iter().find(|f| f.format_id == choice).or_else(|| {
        choice
            .parse::<usize>()
            .ok()
            .and_then(|index| formats.get(index))
    })
}

async fn download(
    config: PipelineConfig,
    url: &str,
    choice: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let pipeline = Pipeline::from_config(&config);
    let formats = fetch(&pipeline, url).await?;

    let format = pick_format(&formats, choice)
        .ok_or_else(|| anyhow!("no format '{}' (run `clip-grabber formats {}`)", choice, url))?;
    let duration = pipeline.media_item().map_or(0, |item| item.duration_seconds);
    let trim = TrimRequest::from_text(start, end, duration)?;

    println!("format {} ({})", format.format_id, format.label);
    if let Some(range) = trim.range() {
        println!("range {} - {}", format_hms(range.start()), format_hms(range.end()));
    }
    println!("saving to {}", pipeline.output_dir().display());

    let mut events = pipeline.start_download(&format.format_id, trim)?;
    let mut stdout = std::io::stdout();
    let mut progress_line = false;

    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::Downloading { percent, speed, eta } => {
                print!("\r{:5.1}%  {:>12}  ETA {:<8}", percent, speed, eta);
                stdout.flush().ok();
                progress_line = true;
            }
            other => {
                if progress_line {
                    println!();
                    progress_line = false;
                }
                match other {
                    ProgressEvent::Stage(stage) => println!("{}", stage),
                    ProgressEvent::Done(path) => {
                        println!("saved {}", path.display());
                        return Ok(());
                    }
                    ProgressEvent::Failed(e) => bail!(e),
                    ProgressEvent::Downloading { .. } => {}
                }
            }
        }
    }

    bail!("download worker stopped without a result")
}

fn show_tools(config: &PipelineConfig) {
    let tools = ToolManager::new();
    let wanted = [
        (ToolType::YtDlp, config.ytdlp_path.as_deref()),
        (ToolType::Ffmpeg, config.ffmpeg_path.as_deref()),
    ];

    for (tool_type, override_path) in wanted {
        let info = tools.get_tool_info(tool_type, override_path);
        let status = if info.is_available { "ok" } else { "missing" };
        println!(
            "{:<8} {:<8} {}  {}",
            info.name,
            status,
            info.path,
            info.version.as_deref().unwrap_or("-")
        );
    }
}
