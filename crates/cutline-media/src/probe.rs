//! Media file probing to get metadata without full decode.

use cutline_core::{CutlineError, RationalTime, Result};
use ffmpeg_sidecar::command::FfmpegCommand;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Information about a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Full duration as probed
    pub duration: RationalTime,
    pub width: u32,
    pub height: u32,
    /// Codec of the primary stream (video if present, else audio)
    pub codec: String,
    /// Overall bit rate in bits per second (0 if unknown)
    pub bitrate: u64,
    /// File size in bytes
    pub file_size: u64,
    pub has_audio: bool,
}

/// Extracts metadata and thumbnails from media files.
pub trait MediaProbe {
    /// Probe a media file.
    ///
    /// Fails with [`CutlineError::MediaNotFound`] or
    /// [`CutlineError::UnreadableFormat`].
    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Render a representative still and return its path.
    fn generate_thumbnail(&self, path: &Path) -> Result<PathBuf>;
}

/// [`MediaProbe`] backed by the `ffprobe` and `ffmpeg` executables.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    thumbnail_dir: PathBuf,
    /// Position of the thumbnail frame in the source.
    thumbnail_at: RationalTime,
}

impl FfprobeProbe {
    /// Create a probe that writes thumbnails into `thumbnail_dir`.
    pub fn new(thumbnail_dir: impl Into<PathBuf>) -> Self {
        Self {
            thumbnail_dir: thumbnail_dir.into(),
            thumbnail_at: RationalTime::from_secs(1),
        }
    }

    /// Set where in the source the thumbnail frame is taken.
    pub fn with_thumbnail_at(mut self, at: RationalTime) -> Self {
        self.thumbnail_at = at;
        self
    }

    fn ffprobe_binary() -> Result<PathBuf> {
        which::which("ffprobe")
            .map_err(|e| CutlineError::Resource(format!("ffprobe not available: {e}")))
    }

    /// Output path of the thumbnail for `path`.
    pub fn thumbnail_path_for(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "thumbnail".to_string());
        self.thumbnail_dir.join(format!("{stem}.jpg"))
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !path.exists() {
            return Err(CutlineError::MediaNotFound(path.to_path_buf()));
        }

        let output = Command::new(Self::ffprobe_binary()?)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(CutlineError::UnreadableFormat(format!(
                "{}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut info = parse_ffprobe_json(&output.stdout)?;
        if info.file_size == 0 {
            info.file_size = std::fs::metadata(path)?.len();
        }
        info!(
            path = %path.display(),
            duration = %info.duration,
            codec = %info.codec,
            "Probed media"
        );
        Ok(info)
    }

    fn generate_thumbnail(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(CutlineError::MediaNotFound(path.to_path_buf()));
        }
        std::fs::create_dir_all(&self.thumbnail_dir)?;
        let out = self.thumbnail_path_for(path);

        let mut child = FfmpegCommand::new()
            .args(["-y", "-loglevel", "error", "-ss"])
            .args([format!("{:.3}", self.thumbnail_at.to_seconds_f64())])
            .args([OsStr::new("-i"), path.as_os_str()])
            .args(["-frames:v", "1"])
            .args([out.as_os_str()])
            .spawn()
            .map_err(|e| CutlineError::Resource(format!("Failed to spawn ffmpeg: {e}")))?;
        let status = child
            .wait()
            .map_err(|e| CutlineError::Resource(format!("Failed to wait for ffmpeg: {e}")))?;

        if !status.success() || !out.exists() {
            return Err(CutlineError::Resource(format!(
                "Thumbnail extraction failed for {}",
                path.display()
            )));
        }
        debug!(thumbnail = %out.display(), "Generated thumbnail");
        Ok(out)
    }
}

// ── ffprobe JSON ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

/// Parse the output of `ffprobe -print_format json -show_format -show_streams`.
pub fn parse_ffprobe_json(data: &[u8]) -> Result<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(data)
        .map_err(|e| CutlineError::UnreadableFormat(format!("Invalid ffprobe output: {e}")))?;

    let primary = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .or_else(|| {
            parsed
                .streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some("audio"))
        })
        .ok_or_else(|| CutlineError::UnreadableFormat("No audio or video streams".into()))?;

    let format = parsed.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .or(primary.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| CutlineError::UnreadableFormat("Missing duration".into()))?;

    let bitrate = format
        .and_then(|f| f.bit_rate.as_deref())
        .or(primary.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let file_size = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        duration: RationalTime::from_seconds_f64(duration),
        width: primary.width.unwrap_or(0),
        height: primary.height.unwrap_or(0),
        codec: primary
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        bitrate,
        file_size,
        has_audio,
    })
}
