//! Short-lived pointer interaction sessions.
//!
//! A session is created on pointer-down, updated on pointer-move and
//! consumed on release. It holds everything the gesture needs so nothing
//! about an in-flight drag lives on the timeline itself.

use cutline_core::{CutlineError, PlacementTime, RationalTime, Result};

use crate::edit::{Affected, TimelineEdit};
use crate::id::{InstanceId, TrackId};
use crate::placement::{clamped_trim, SnapResult, TrimHandle};
use crate::timeline::Timeline;

/// Dragging an instance to a new position or track.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub instance_id: InstanceId,
    pub origin_track: TrackId,
    /// Pointer position relative to the instance's placement start.
    pub grab_offset: RationalTime,
    pub pointer_origin: PlacementTime,
    /// Pointer travel since pointer-down.
    pub delta: RationalTime,
    last_snap: SnapResult,
}

impl DragSession {
    pub fn begin(timeline: &Timeline, instance_id: InstanceId, pointer: PlacementTime) -> Result<Self> {
        let (origin_track, clip) = timeline
            .find_instance(instance_id)
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {instance_id}")))?;
        Ok(Self {
            instance_id,
            origin_track,
            grab_offset: pointer - clip.start_time,
            pointer_origin: pointer,
            delta: RationalTime::ZERO,
            last_snap: SnapResult {
                time: clip.start_time,
                snapped: false,
            },
        })
    }

    /// Track the pointer. The proposed drop position snaps to other
    /// instances' active edges.
    pub fn update(&mut self, timeline: &Timeline, pointer: PlacementTime) -> SnapResult {
        self.delta = pointer - self.pointer_origin;
        let proposed = (pointer - self.grab_offset).max(PlacementTime::ZERO);
        self.last_snap = timeline.find_snap_point(proposed, Some(self.instance_id));
        self.last_snap
    }

    /// Where the instance would land if released now.
    pub fn drop_time(&self) -> PlacementTime {
        self.last_snap.time
    }

    pub fn is_snapped(&self) -> bool {
        self.last_snap.snapped
    }

    /// Release over `to_track`, committing the move as an undoable edit.
    pub fn finish(self, timeline: &mut Timeline, to_track: TrackId) -> Result<Affected> {
        timeline.apply(TimelineEdit::Reposition {
            instance_id: self.instance_id,
            from_track: self.origin_track,
            to_track,
            target_time: self.drop_time(),
        })
    }
}

/// Dragging one trim handle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimSession {
    pub instance_id: InstanceId,
    pub handle: TrimHandle,
    pub delta: RationalTime,
}

impl TrimSession {
    pub fn begin(timeline: &Timeline, instance_id: InstanceId, handle: TrimHandle) -> Result<Self> {
        timeline
            .find_instance(instance_id)
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {instance_id}")))?;
        Ok(Self {
            instance_id,
            handle,
            delta: RationalTime::ZERO,
        })
    }

    /// Set the accumulated handle travel.
    pub fn update(&mut self, delta: RationalTime) {
        self.delta = delta;
    }

    /// Trim bounds the release would produce, without touching the model.
    pub fn preview(&self, timeline: &Timeline) -> Option<(RationalTime, RationalTime)> {
        let (_, clip) = timeline.find_instance(self.instance_id)?;
        let epsilon = timeline.config().min_active_duration();
        Some(clamped_trim(clip, self.handle, self.delta, epsilon))
    }

    pub fn finish(self, timeline: &mut Timeline) -> Result<Affected> {
        timeline.apply(TimelineEdit::Trim {
            instance_id: self.instance_id,
            handle: self.handle,
            delta: self.delta,
        })
    }
}
