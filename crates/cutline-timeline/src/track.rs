//! Tracks: ordered sequences of clip instances.

use cutline_core::{PlacementTime, RationalTime};
use serde::{Deserialize, Serialize};

use crate::clip::ClipInstance;
use crate::id::{InstanceId, SourceClipId, TrackId};

/// A track of clips. Order defines playback and placement order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: TrackId,
    /// Track name
    pub name: String,
    clips: Vec<ClipInstance>,
}

impl Track {
    /// Create an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            clips: Vec::new(),
        }
    }

    pub fn clips(&self) -> &[ClipInstance] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Index of an instance on this track.
    pub fn find_clip(&self, id: InstanceId) -> Option<usize> {
        self.clips.iter().position(|c| c.instance_id == id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&ClipInstance> {
        self.clips.iter().find(|c| c.instance_id == id)
    }

    pub(crate) fn clip_mut(&mut self, index: usize) -> Option<&mut ClipInstance> {
        self.clips.get_mut(index)
    }

    /// Sum of active durations. Equal to the end of the last active region.
    pub fn active_duration(&self) -> RationalTime {
        self.clips.iter().map(ClipInstance::active_duration).sum()
    }

    /// Furthest visual extent, including trimmed overlays.
    pub fn placement_extent(&self) -> PlacementTime {
        self.clips
            .iter()
            .map(ClipInstance::placement_end)
            .max()
            .unwrap_or(PlacementTime::ZERO)
    }

    // ── Mutation (callers recompute placement) ─────────────────

    pub(crate) fn push(&mut self, clip: ClipInstance) {
        self.clips.push(clip);
    }

    pub(crate) fn insert(&mut self, index: usize, clip: ClipInstance) {
        let index = index.min(self.clips.len());
        self.clips.insert(index, clip);
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<ClipInstance> {
        (index < self.clips.len()).then(|| self.clips.remove(index))
    }

    pub(crate) fn clear(&mut self) -> Vec<ClipInstance> {
        std::mem::take(&mut self.clips)
    }

    /// Drop every instance of `source`, returning how many were removed.
    pub(crate) fn remove_source(&mut self, source: SourceClipId) -> usize {
        let before = self.clips.len();
        self.clips.retain(|c| c.source_clip_id != source);
        before - self.clips.len()
    }

    /// Re-walk the track in order and set each `start_time` to the sum of
    /// the preceding active durations.
    pub fn recompute_placement(&mut self) {
        let mut cursor = PlacementTime::ZERO;
        for clip in &mut self.clips {
            clip.start_time = cursor;
            cursor = cursor + clip.active_duration();
        }
    }

    /// Whether every `start_time` matches its cumulative active offset.
    pub fn is_placement_consistent(&self) -> bool {
        let mut cursor = PlacementTime::ZERO;
        self.clips.iter().all(|clip| {
            let ok = clip.start_time == cursor;
            cursor = cursor + clip.active_duration();
            ok
        })
    }
}
