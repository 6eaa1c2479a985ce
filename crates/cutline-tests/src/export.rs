//! Integration tests for export planning.
//!
//! Builds segment lists from edited projects and checks the FFmpeg command
//! derived from them. Nothing here spawns FFmpeg.

use cutline_core::{ProgramTime, RationalTime, SourceTime};
use cutline_media::{
    export::validate_segments, Encoder, ExportFormat, FfmpegEncoder, QualityProfile,
};
use cutline_timeline::{Project, SourceClip, TimelineEdit, TrimHandle};
use std::path::Path;

fn secs(s: i64) -> RationalTime {
    RationalTime::from_secs(s)
}

fn edited_project() -> Project {
    let mut project = Project::new("Export");
    let a = project
        .registry
        .register(SourceClip::new("media/a.mp4", secs(30)))
        .unwrap();
    let b = project
        .registry
        .register(SourceClip::new("media/b.mp4", secs(10)))
        .unwrap();
    let track = project.timeline.program_track().id;
    let first = project.add_clip(track, a, Some((secs(5), secs(15)))).unwrap();
    project.add_clip(track, b, None).unwrap();
    project
        .timeline
        .apply(TimelineEdit::Split {
            instance_id: first,
            at: ProgramTime::from_secs(4),
        })
        .unwrap();
    project
}

#[test]
fn segments_cover_program_in_order() {
    let project = edited_project();
    let segments = project.export_segments().unwrap();
    assert_eq!(segments.len(), 3);

    let total = validate_segments(&segments).unwrap();
    assert_eq!(total, project.timeline.program_duration());

    let starts: Vec<_> = segments.iter().map(|s| s.program_start).collect();
    assert_eq!(
        starts,
        vec![
            ProgramTime::ZERO,
            ProgramTime::from_secs(4),
            ProgramTime::from_secs(10)
        ]
    );
    assert_eq!(segments[0].source_start, SourceTime::from_secs(5));
    assert_eq!(segments[1].source_end, SourceTime::from_secs(15));
    assert_eq!(segments[2].path, Path::new("media/b.mp4"));
}

#[test]
fn trims_flow_into_ffmpeg_arguments() {
    let mut project = edited_project();
    let last = project.timeline.program_clips()[2].instance_id;
    project
        .timeline
        .apply(TimelineEdit::Trim {
            instance_id: last,
            handle: TrimHandle::Start,
            delta: RationalTime::from_millis(2500),
        })
        .unwrap();

    let segments = project.export_segments().unwrap();
    let encoder = FfmpegEncoder::new(ExportFormat::h264_hd());
    let args = encoder.ffmpeg_args(&segments, Path::new("out.mp4"), QualityProfile::High);

    let seeks: Vec<_> = args
        .windows(2)
        .filter(|w| w[0] == "-ss")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(seeks, vec!["5.000000", "9.000000", "2.500000"]);
    let lengths: Vec<_> = args
        .windows(2)
        .filter(|w| w[0] == "-t")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(lengths, vec!["4.000000", "6.000000", "7.500000"]);
    assert!(args.iter().any(|a| a.contains("concat=n=3")));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
}

#[test]
fn empty_program_cannot_be_exported() {
    let project = Project::new("Empty");
    let segments = project.export_segments().unwrap();
    assert!(segments.is_empty());

    let encoder = FfmpegEncoder::new(ExportFormat::default());
    let err = encoder
        .export(&segments, Path::new("out.mp4"), QualityProfile::Draft)
        .unwrap_err();
    assert!(err.is_validation());
}
