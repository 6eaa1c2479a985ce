//! Placement engine: reposition, snapping and trim.
//!
//! Instances never overlap in program time. Drops pick an insertion index
//! instead of a free position, and the owning tracks are re-walked after
//! every change.

use cutline_core::{CutlineError, PlacementTime, RationalTime, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clip::ClipInstance;
use crate::id::{InstanceId, TrackId};
use crate::timeline::{Timeline, TimelineEvent};
use crate::track::Track;

/// Which edge of the active region a trim moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimHandle {
    Start,
    End,
}

/// Outcome of a snap query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapResult {
    pub time: PlacementTime,
    /// True when `time` was pulled onto a neighbouring edge.
    pub snapped: bool,
}

/// Insertion index for a drop at `target` on a track.
///
/// A drop strictly inside an instance's visual span takes that instance's
/// index. Otherwise the index is the count of instances whose visual span
/// ends at or before `target`.
pub fn target_index(clips: &[ClipInstance], target: PlacementTime) -> usize {
    if let Some(index) = clips
        .iter()
        .position(|c| c.start_time < target && target < c.placement_end())
    {
        return index;
    }
    clips.iter().filter(|c| c.placement_end() <= target).count()
}

/// Nearest active-region edge within `threshold` of `target` across all
/// tracks, skipping `exclude`. Ties go to the first edge in track order.
pub fn find_snap_point(
    tracks: &[Track],
    target: PlacementTime,
    exclude: Option<InstanceId>,
    threshold: RationalTime,
) -> SnapResult {
    let mut best: Option<(RationalTime, PlacementTime)> = None;
    let edges = tracks
        .iter()
        .flat_map(|t| t.clips())
        .filter(|c| Some(c.instance_id) != exclude)
        .flat_map(|c| [c.active_start(), c.active_end()]);
    for edge in edges {
        let distance = (edge - target).abs();
        if distance > threshold {
            continue;
        }
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, edge));
        }
    }
    match best {
        Some((_, time)) => SnapResult { time, snapped: true },
        None => SnapResult {
            time: target,
            snapped: false,
        },
    }
}

/// Trim bounds after moving `handle` by `delta`, clamped so that at least
/// `epsilon` of active duration remains and the region stays within the
/// instance.
pub fn clamped_trim(
    clip: &ClipInstance,
    handle: TrimHandle,
    delta: RationalTime,
    epsilon: RationalTime,
) -> (RationalTime, RationalTime) {
    let (start, end) = (clip.trim_start, clip.trim_end);
    match handle {
        TrimHandle::Start => {
            let start = (start + delta).min(end - epsilon).max(RationalTime::ZERO);
            (start, end)
        }
        TrimHandle::End => {
            let end = (end + delta).max(start + epsilon).min(clip.own_duration);
            (start, end)
        }
    }
}

impl Timeline {
    /// Move an instance to the index implied by dropping it at
    /// `target_time` on `to_track`. Returns the final index.
    ///
    /// Dropping onto its own position is a no-op that still announces the
    /// selection.
    pub fn reposition(
        &mut self,
        instance_id: InstanceId,
        from_track: TrackId,
        to_track: TrackId,
        target_time: PlacementTime,
    ) -> Result<usize> {
        let src_ti = self.track_index(from_track)?;
        let dst_ti = self.track_index(to_track)?;
        let src_index = self.tracks[src_ti].find_clip(instance_id).ok_or_else(|| {
            CutlineError::NotFound(format!("clip instance {instance_id} on track {from_track}"))
        })?;

        let mut index = target_index(self.tracks[dst_ti].clips(), target_time);
        let same_track = src_ti == dst_ti;
        if same_track {
            if src_index < index {
                index -= 1;
            }
            index = index.min(self.tracks[dst_ti].len() - 1);
            if index == src_index {
                self.emit(TimelineEvent::ClipSelected { instance_id });
                return Ok(index);
            }
        } else {
            index = index.min(self.tracks[dst_ti].len());
        }

        let clip = self.tracks[src_ti]
            .remove(src_index)
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {instance_id}")))?;
        self.tracks[dst_ti].insert(index, clip);
        if same_track {
            self.recompute(&[src_ti]);
        } else {
            self.recompute(&[src_ti, dst_ti]);
        }
        debug!(instance = %instance_id, from = src_index, to = index, "Clip repositioned");
        self.emit(TimelineEvent::Edited);
        self.emit(TimelineEvent::ClipSelected { instance_id });
        Ok(index)
    }

    /// Move one edge of an instance's active region by `delta`, clamped to
    /// the instance and to the minimum active duration.
    pub fn trim(&mut self, instance_id: InstanceId, handle: TrimHandle, delta: RationalTime) -> Result<()> {
        let (ti, ci) = self.locate(instance_id)?;
        let epsilon = self.config.min_active_duration();
        let clip = self.tracks[ti]
            .clip_mut(ci)
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {instance_id}")))?;
        let (start, end) = clamped_trim(clip, handle, delta, epsilon);
        clip.trim_start = start;
        clip.trim_end = end;
        self.recompute(&[ti]);
        debug!(instance = %instance_id, ?handle, start = %start, end = %end, "Clip trimmed");
        self.emit(TimelineEvent::Edited);
        Ok(())
    }

    /// Snap against every other instance using the configured threshold.
    pub fn find_snap_point(&self, target: PlacementTime, exclude: Option<InstanceId>) -> SnapResult {
        find_snap_point(&self.tracks, target, exclude, self.config.snap_threshold())
    }
}
