//! Cutline - headless front end to the timeline engine.
//!
//! Probes media, assembles and inspects project files, renders them with
//! FFmpeg and replays them through the playback synchronizer.

mod simulate;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cutline_core::EngineConfig;
use cutline_media::{
    Encoder, ExportEvent, ExportFormat, FfmpegEncoder, FfprobeProbe, MediaProbe, QualityProfile,
};
use cutline_timeline::{Project, ProjectFile};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cutline", version, about = "Non-linear timeline engine")]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE", env = "CUTLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the metadata of a media file as JSON
    Probe {
        file: PathBuf,
        /// Also render a thumbnail into this directory
        #[arg(long, value_name = "DIR")]
        thumbnail: Option<PathBuf>,
    },
    /// Import media into a project file, appending to the program track
    Import {
        project: PathBuf,
        #[arg(required = true)]
        media: Vec<PathBuf>,
    },
    /// Print the export segments of a project
    Plan { project: PathBuf },
    /// Render a project with FFmpeg
    Export {
        project: PathBuf,
        output: PathBuf,
        /// draft, normal, high or lossless
        #[arg(long, default_value = "normal")]
        quality: QualityProfile,
        /// h264-hd, h265-4k or vp9-web
        #[arg(long, default_value = "h264-hd")]
        preset: String,
    },
    /// Play a project headlessly and report its transitions
    Simulate {
        project: PathBuf,
        /// Surface clock step in milliseconds
        #[arg(long, default_value = "40")]
        step_ms: u64,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Command::Probe { file, thumbnail } => probe(&file, thumbnail),
        Command::Import { project, media } => import(&config, &project, &media),
        Command::Plan { project } => plan(&config, &project),
        Command::Export {
            project,
            output,
            quality,
            preset,
        } => export(&config, &project, &output, quality, &preset),
        Command::Simulate { project, step_ms } => {
            let mut project = open_project(&config, &project)?;
            let report = simulate::run(&mut project, &config.playback, step_ms)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Config => {
            println!("{}", String::from_utf8(config.to_json()?)?);
            Ok(())
        }
    }
}

fn open_project(config: &EngineConfig, path: &Path) -> Result<Project> {
    let file = ProjectFile::open(path)
        .with_context(|| format!("failed to open project {}", path.display()))?;
    let mut project = file.project;
    project.configure(config);
    Ok(project)
}

fn probe(file: &Path, thumbnail: Option<PathBuf>) -> Result<()> {
    let dir = thumbnail.clone().unwrap_or_else(std::env::temp_dir);
    let probe = FfprobeProbe::new(dir);
    let info = probe.probe(file)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    if thumbnail.is_some() {
        let path = probe.generate_thumbnail(file)?;
        println!("thumbnail: {}", path.display());
    }
    Ok(())
}

fn import(config: &EngineConfig, path: &Path, media: &[PathBuf]) -> Result<()> {
    let mut project = if path.exists() {
        open_project(config, path)?
    } else {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled Project".to_string());
        let mut project = Project::new(name);
        project.configure(config);
        project
    };

    let thumbnails = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("thumbnails");
    let probe = FfprobeProbe::new(thumbnails);
    let track = project.timeline.program_track().id;
    for file in media {
        let source = project
            .import_media(&probe, file)
            .with_context(|| format!("failed to import {}", file.display()))?;
        project.add_clip(track, source, None)?;
    }
    info!(
        sources = project.registry.len(),
        duration = %project.timeline.program_duration(),
        "Project updated"
    );
    ProjectFile::new(project).save(path)?;
    Ok(())
}

fn plan(config: &EngineConfig, path: &Path) -> Result<()> {
    let project = open_project(config, path)?;
    let segments = project.export_segments()?;
    println!("{}", serde_json::to_string_pretty(&segments)?);
    Ok(())
}

fn export(
    config: &EngineConfig,
    path: &Path,
    output: &Path,
    quality: QualityProfile,
    preset: &str,
) -> Result<()> {
    let format = match preset {
        "h264-hd" => ExportFormat::h264_hd(),
        "h265-4k" => ExportFormat::h265_4k(),
        "vp9-web" => ExportFormat::vp9_web(),
        other => bail!("unknown preset {other:?}"),
    };
    let project = open_project(config, path)?;
    let segments = project.export_segments()?;
    let handle = FfmpegEncoder::new(format).export(&segments, output, quality)?;

    let mut decade = None;
    for event in handle.events.iter() {
        match event {
            ExportEvent::Progress(percent) => {
                if let Some(whole) = next_decade(&mut decade, percent) {
                    info!(percent = whole, "Exporting");
                }
            }
            ExportEvent::Complete(path) => {
                info!(output = %path.display(), "Export complete");
                return Ok(());
            }
            ExportEvent::Error(message) => {
                warn!(error = %message, "Export failed");
                bail!("export failed: {message}");
            }
        }
    }
    bail!("export worker exited without a result")
}

/// Whole percentage to log when `percent` enters a new ten-percent band.
fn next_decade(last: &mut Option<i64>, percent: f64) -> Option<i64> {
    let whole = percent.floor() as i64;
    let band = whole.div_euclid(10);
    if *last == Some(band) {
        return None;
    }
    *last = Some(band);
    Some(whole)
}
