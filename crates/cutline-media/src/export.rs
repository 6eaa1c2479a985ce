//! Export of an edited program to a single video file.
//!
//! The timeline hands over its ordered active segments; FFmpeg trims each
//! source, normalises it to the output format and concatenates the result.
//! Progress, completion and failure arrive as [`ExportEvent`]s on a channel.

use crossbeam_channel::{unbounded, Receiver, Sender};
use cutline_core::{CutlineError, FrameRate, ProgramTime, RationalTime, Result, SourceTime};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

// ── Format presets ──────────────────────────────────────────────

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
    ProRes422,
    Vp9,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::ProRes422 => "prores_ks",
            Self::Vp9 => "libvpx-vp9",
        }
    }

    /// File extension for this codec.
    pub fn extension(self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "mp4",
            Self::ProRes422 => "mov",
            Self::Vp9 => "webm",
        }
    }
}

/// Audio codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Pcm,
    Opus,
}

impl AudioCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Pcm => "pcm_s16le",
            Self::Opus => "libopus",
        }
    }
}

/// Export quality profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Draft,
    #[default]
    Normal,
    High,
    Lossless,
}

impl QualityProfile {
    /// CRF for the given codec, if it is CRF-driven.
    pub fn crf(self, codec: VideoCodec) -> Option<u32> {
        match codec {
            VideoCodec::H264 | VideoCodec::H265 => Some(match self {
                Self::Draft => 28,
                Self::Normal => 23,
                Self::High => 18,
                Self::Lossless => 0,
            }),
            VideoCodec::Vp9 => Some(match self {
                Self::Draft => 40,
                Self::Normal => 33,
                Self::High => 24,
                Self::Lossless => 0,
            }),
            VideoCodec::ProRes422 => None,
        }
    }

    /// x264/x265 speed preset.
    pub fn speed_preset(self) -> &'static str {
        match self {
            Self::Draft => "ultrafast",
            Self::Normal => "medium",
            Self::High | Self::Lossless => "slow",
        }
    }
}

impl std::str::FromStr for QualityProfile {
    type Err = CutlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "lossless" => Ok(Self::Lossless),
            other => Err(CutlineError::validation(format!(
                "unknown quality profile: {other}"
            ))),
        }
    }
}

/// Export format configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportFormat {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Carry the sources' first audio stream through the concat.
    pub include_audio: bool,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
}

impl ExportFormat {
    /// H.264 HD preset.
    pub fn h264_hd() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::FPS_30,
            include_audio: true,
            audio_bitrate: 192,
        }
    }

    /// H.265 4K preset.
    pub fn h265_4k() -> Self {
        Self {
            video_codec: VideoCodec::H265,
            audio_codec: AudioCodec::Aac,
            width: 3840,
            height: 2160,
            frame_rate: FrameRate::FPS_30,
            include_audio: true,
            audio_bitrate: 256,
        }
    }

    /// Web-optimized VP9.
    pub fn vp9_web() -> Self {
        Self {
            video_codec: VideoCodec::Vp9,
            audio_codec: AudioCodec::Opus,
            width: 1920,
            height: 1080,
            frame_rate: FrameRate::FPS_30,
            include_audio: true,
            audio_bitrate: 128,
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::h264_hd()
    }
}

// ── Segments and events ─────────────────────────────────────────

/// One active span of a source file, in program order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSegment {
    pub path: PathBuf,
    pub source_start: SourceTime,
    pub source_end: SourceTime,
    pub program_start: ProgramTime,
    /// The source file has an audio stream to concat.
    pub has_audio: bool,
}

impl ExportSegment {
    pub fn duration(&self) -> RationalTime {
        self.source_end - self.source_start
    }
}

/// Export lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    /// Completion percentage, 0.0 to 100.0.
    Progress(f64),
    Complete(PathBuf),
    Error(String),
}

/// Handle for cancelling an in-progress export.
#[derive(Debug, Clone)]
pub struct ExportCancel(Arc<AtomicBool>);

impl ExportCancel {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ExportCancel {
    fn default() -> Self {
        Self::new()
    }
}

/// A running export.
#[derive(Debug)]
pub struct ExportHandle {
    pub events: Receiver<ExportEvent>,
    pub cancel: ExportCancel,
}

/// Consumes a final ordered segment list and renders it.
pub trait Encoder {
    fn export(
        &self,
        segments: &[ExportSegment],
        output_path: &Path,
        quality: QualityProfile,
    ) -> Result<ExportHandle>;
}

/// Reject empty exports and inverted spans before anything is spawned.
pub fn validate_segments(segments: &[ExportSegment]) -> Result<RationalTime> {
    if segments.is_empty() {
        return Err(CutlineError::validation("nothing to export"));
    }
    let mut total = RationalTime::ZERO;
    for (i, segment) in segments.iter().enumerate() {
        if segment.duration() <= RationalTime::ZERO {
            return Err(CutlineError::validation(format!(
                "segment {i} has non-positive duration"
            )));
        }
        total = total + segment.duration();
    }
    Ok(total)
}

// ── FFmpeg encoder ──────────────────────────────────────────────

/// [`Encoder`] that drives an FFmpeg process on a worker thread.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    pub format: ExportFormat,
}

impl FfmpegEncoder {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Audio is rendered only when the format asks for it and every input
    /// has a stream to feed the concat.
    pub fn carries_audio(&self, segments: &[ExportSegment]) -> bool {
        self.format.include_audio && segments.iter().all(|s| s.has_audio)
    }

    /// Build the FFmpeg command arguments.
    pub fn ffmpeg_args(
        &self,
        segments: &[ExportSegment],
        output_path: &Path,
        quality: QualityProfile,
    ) -> Vec<String> {
        let f = &self.format;
        let audio = self.carries_audio(segments);
        let mut args: Vec<String> = vec!["-y".into()];

        for segment in segments {
            args.extend_from_slice(&[
                "-ss".into(),
                format!("{:.6}", segment.source_start.to_seconds_f64()),
                "-t".into(),
                format!("{:.6}", segment.duration().to_seconds_f64()),
                "-i".into(),
                segment.path.to_string_lossy().into_owned(),
            ]);
        }

        args.extend_from_slice(&["-filter_complex".into(), self.filter_graph(segments.len(), audio)]);
        args.extend_from_slice(&["-map".into(), "[v]".into()]);
        if audio {
            args.extend_from_slice(&["-map".into(), "[a]".into()]);
        }

        args.extend_from_slice(&["-c:v".into(), f.video_codec.ffmpeg_encoder().into()]);
        if let Some(crf) = quality.crf(f.video_codec) {
            args.extend_from_slice(&["-crf".into(), crf.to_string()]);
        }
        match f.video_codec {
            VideoCodec::H264 | VideoCodec::H265 => {
                args.extend_from_slice(&["-preset".into(), quality.speed_preset().into()]);
                args.extend_from_slice(&["-pix_fmt".into(), "yuv420p".into()]);
            }
            VideoCodec::Vp9 => {
                args.extend_from_slice(&["-b:v".into(), "0".into()]);
                if quality == QualityProfile::Lossless {
                    args.extend_from_slice(&["-lossless".into(), "1".into()]);
                }
            }
            VideoCodec::ProRes422 => {
                args.extend_from_slice(&["-profile:v".into(), "2".into()]);
            }
        }

        if audio {
            args.extend_from_slice(&[
                "-c:a".into(),
                f.audio_codec.ffmpeg_encoder().into(),
                "-b:a".into(),
                format!("{}k", f.audio_bitrate),
            ]);
        }

        args.push(output_path.to_string_lossy().into_owned());
        args
    }

    /// Scale/pad every input to the output geometry, then concat.
    fn filter_graph(&self, inputs: usize, audio: bool) -> String {
        let f = &self.format;
        let mut graph = String::new();
        let mut concat_inputs = String::new();
        for i in 0..inputs {
            graph.push_str(&format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={n}/{d}[v{i}];",
                w = f.width,
                h = f.height,
                n = f.frame_rate.numerator,
                d = f.frame_rate.denominator,
            ));
            concat_inputs.push_str(&format!("[v{i}]"));
            if audio {
                graph.push_str(&format!("[{i}:a]aresample=48000[a{i}];"));
                concat_inputs.push_str(&format!("[a{i}]"));
            }
        }
        let audio_streams = usize::from(audio);
        let outputs = if audio { "[v][a]" } else { "[v]" };
        graph.push_str(&format!(
            "{concat_inputs}concat=n={inputs}:v=1:a={audio_streams}{outputs}"
        ));
        graph
    }
}

impl Encoder for FfmpegEncoder {
    fn export(
        &self,
        segments: &[ExportSegment],
        output_path: &Path,
        quality: QualityProfile,
    ) -> Result<ExportHandle> {
        let total = validate_segments(segments)?;
        if self.format.include_audio && !self.carries_audio(segments) {
            warn!("Some sources have no audio stream; exporting video only");
        }
        let args = self.ffmpeg_args(segments, output_path, quality);
        let output_path = output_path.to_path_buf();
        let (tx, rx) = unbounded();
        let cancel = ExportCancel::new();
        let worker_cancel = cancel.clone();

        info!(
            segments = segments.len(),
            duration = %total,
            output = %output_path.display(),
            "Starting export"
        );

        std::thread::Builder::new()
            .name("cutline-export".into())
            .spawn(move || {
                let event = match run_ffmpeg(&args, total, &tx, &worker_cancel) {
                    Ok(()) => {
                        info!(output = %output_path.display(), "Export complete");
                        ExportEvent::Complete(output_path)
                    }
                    Err(e) => {
                        warn!(error = %e, "Export failed");
                        ExportEvent::Error(e.to_string())
                    }
                };
                let _ = tx.send(event);
            })?;

        Ok(ExportHandle { events: rx, cancel })
    }
}

fn run_ffmpeg(
    args: &[String],
    total: RationalTime,
    tx: &Sender<ExportEvent>,
    cancel: &ExportCancel,
) -> Result<()> {
    let mut child = FfmpegCommand::new()
        .args(args)
        .spawn()
        .map_err(|e| CutlineError::Encoder(format!("Failed to spawn ffmpeg: {e}")))?;
    let events = child
        .iter()
        .map_err(|e| CutlineError::Encoder(format!("Failed to read ffmpeg output: {e}")))?;

    let mut last_error = None;
    for event in events {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CutlineError::Encoder("Export cancelled".into()));
        }
        match event {
            FfmpegEvent::Progress(progress) => {
                if let Some(done) = parse_progress_time(&progress.time) {
                    let _ = tx.send(ExportEvent::Progress(progress_percent(done, total)));
                }
            }
            FfmpegEvent::Error(message) => last_error = Some(message),
            _ => {}
        }
    }

    let status = child
        .wait()
        .map_err(|e| CutlineError::Encoder(format!("Failed to wait for ffmpeg: {e}")))?;
    if !status.success() {
        return Err(CutlineError::Encoder(match last_error {
            Some(message) => format!("ffmpeg exited with {status}: {message}"),
            None => format!("ffmpeg exited with {status}"),
        }));
    }
    Ok(())
}

/// Parse FFmpeg's `HH:MM:SS.ss` progress clock.
pub fn parse_progress_time(time: &str) -> Option<RationalTime> {
    let mut parts = time.trim().split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0 || minutes < 0 || seconds < 0.0 {
        return None;
    }
    Some(RationalTime::from_secs(hours * 3600 + minutes * 60) + RationalTime::from_seconds_f64(seconds))
}

fn progress_percent(done: RationalTime, total: RationalTime) -> f64 {
    if total <= RationalTime::ZERO {
        return 0.0;
    }
    (done.to_seconds_f64() / total.to_seconds_f64() * 100.0).clamp(0.0, 100.0)
}
