//! Time-domain translation.
//!
//! Pure functions over one track's ordered instances (normally the program
//! track). Lookups in program time binary-search on `start_time`, which the
//! placement invariant keeps equal to the cumulative active offset.

use cutline_core::{PlacementTime, ProgramTime, RationalTime, Result, SourceTime};
use cutline_media::ExportSegment;

use crate::clip::ClipInstance;
use crate::registry::ClipRegistry;

/// Where a program time falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramLocation {
    /// Index of the instance on the track
    pub index: usize,
    /// Program time at which this instance's active region begins
    pub cumulative: ProgramTime,
    /// Offset into the active region
    pub offset: RationalTime,
}

/// Program time at which instance `clip` begins.
#[inline]
pub fn cumulative_offset(clip: &ClipInstance) -> ProgramTime {
    ProgramTime::new(clip.start_time.as_rational())
}

/// Total active duration of the track.
pub fn active_total(clips: &[ClipInstance]) -> RationalTime {
    clips
        .last()
        .map(|c| c.start_time.as_rational() + c.active_duration())
        .unwrap_or(RationalTime::ZERO)
}

/// Find the instance whose active window `[cumulative, cumulative + active)`
/// contains `p`. `None` when `p` is negative or at/after the end.
pub fn locate_program(clips: &[ClipInstance], p: ProgramTime) -> Option<ProgramLocation> {
    if p < ProgramTime::ZERO {
        return None;
    }
    let index = clips.partition_point(|c| cumulative_offset(c) + c.active_duration() <= p);
    let clip = clips.get(index)?;
    let cumulative = cumulative_offset(clip);
    Some(ProgramLocation {
        index,
        cumulative,
        offset: p - cumulative,
    })
}

/// Program time to placement time.
///
/// Past the end, clamps to the end of the last instance's active region.
pub fn program_to_placement(clips: &[ClipInstance], p: ProgramTime) -> PlacementTime {
    match locate_program(clips, p) {
        Some(loc) => clips[loc.index].active_start() + loc.offset,
        None if p < ProgramTime::ZERO => clips
            .first()
            .map(ClipInstance::active_start)
            .unwrap_or(PlacementTime::ZERO),
        None => clips
            .last()
            .map(ClipInstance::active_end)
            .unwrap_or(PlacementTime::ZERO),
    }
}

/// Placement time to `(instance index, program time)`.
///
/// A `v` inside a trimmed-out overlay or before the first active region
/// advances to the next instance's active start; past everything it clamps
/// to the last instance's active end. When visual spans overlap, the first
/// instance in track order wins. `None` on an empty track.
pub fn placement_to_program(clips: &[ClipInstance], v: PlacementTime) -> Option<(usize, ProgramTime)> {
    if let Some((index, clip)) = clips
        .iter()
        .enumerate()
        .find(|(_, c)| c.active_start() <= v && v < c.active_end())
    {
        return Some((index, cumulative_offset(clip) + (v - clip.active_start())));
    }
    if let Some((index, clip)) = clips.iter().enumerate().find(|(_, c)| c.active_start() > v) {
        return Some((index, cumulative_offset(clip)));
    }
    let last = clips.len().checked_sub(1)?;
    Some((last, ProgramTime::new(active_total(clips))))
}

/// Program time to `(instance index, source time)` in that instance's media.
pub fn program_to_source(clips: &[ClipInstance], p: ProgramTime) -> Option<(usize, SourceTime)> {
    let loc = locate_program(clips, p)?;
    Some((loc.index, clips[loc.index].source_at(loc.offset)))
}

/// Ordered active segments for the encoder.
pub fn export_segments(clips: &[ClipInstance], registry: &ClipRegistry) -> Result<Vec<ExportSegment>> {
    clips
        .iter()
        .map(|clip| {
            let source = registry.require(clip.source_clip_id)?;
            Ok(ExportSegment {
                path: source.file_path.clone(),
                source_start: clip.source_in(),
                source_end: clip.source_out(),
                program_start: cumulative_offset(clip),
                has_audio: source.has_audio,
            })
        })
        .collect()
}
