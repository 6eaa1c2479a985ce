//! Cutline Media - FFmpeg integration for probing and export
//!
//! This crate handles the external media collaborators:
//! - Media file probing (duration, dimensions, codec) and thumbnails
//! - Export of an ordered list of active source segments

pub mod export;
pub mod probe;

pub use export::{
    AudioCodec, Encoder, ExportCancel, ExportEvent, ExportFormat, ExportHandle, ExportSegment,
    FfmpegEncoder, QualityProfile, VideoCodec,
};
pub use probe::{FfprobeProbe, MediaInfo, MediaProbe};
