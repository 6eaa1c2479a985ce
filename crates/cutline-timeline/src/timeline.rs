//! The timeline model: tracks, playhead, zoom and the change stream.
//!
//! Every mutation re-walks the affected tracks so that each instance's
//! `start_time` equals the summed active durations before it, then
//! recomputes the program duration and keeps the playhead inside it.

use crossbeam_channel::{unbounded, Receiver, Sender};
use cutline_core::{
    CutlineError, PlacementTime, ProgramTime, RationalTime, Result, TimelineConfig,
};
use cutline_media::ExportSegment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clip::{validate_trim, ClipInstance, SourceSpan};
use crate::edit::UndoStack;
use crate::id::{InstanceId, SourceClipId, TrackId};
use crate::registry::{ClipRegistry, SourceClip};
use crate::track::Track;
use crate::translate;

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    PlayheadChanged { position: ProgramTime },
    ClipSelected { instance_id: InstanceId },
    /// Tracks, trims or order changed.
    Edited,
}

/// Read-only copy of the timeline for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSnapshot {
    pub tracks: Vec<Track>,
    pub playhead: ProgramTime,
    pub zoom: f64,
    pub program_duration: RationalTime,
}

/// Ordered tracks plus the authoritative playhead.
///
/// Track 0 is the program track: program time, playback and export all
/// follow it. There is always at least one track.
#[derive(Debug, Serialize, Deserialize)]
#[serde(from = "TimelineData")]
pub struct Timeline {
    pub(crate) tracks: Vec<Track>,
    pub(crate) playhead: ProgramTime,
    pub(crate) zoom: f64,
    #[serde(skip)]
    pub(crate) program_duration: RationalTime,
    #[serde(skip)]
    pub(crate) config: TimelineConfig,
    #[serde(skip)]
    listeners: Vec<Sender<TimelineEvent>>,
    #[serde(skip)]
    pub(crate) history: UndoStack,
}

/// Persisted form. Derived state is rebuilt on load.
#[derive(Deserialize)]
struct TimelineData {
    tracks: Vec<Track>,
    #[serde(default)]
    playhead: ProgramTime,
    #[serde(default = "default_zoom")]
    zoom: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl From<TimelineData> for Timeline {
    fn from(data: TimelineData) -> Self {
        let mut timeline = Self::new();
        if !data.tracks.is_empty() {
            timeline.tracks = data.tracks;
        }
        if data.zoom.is_finite() && data.zoom > 0.0 {
            timeline.zoom = data.zoom;
        }
        let touched: Vec<usize> = (0..timeline.tracks.len()).collect();
        timeline.recompute(&touched);
        timeline.playhead = data.playhead.max(ProgramTime::ZERO);
        timeline.clamp_playhead();
        timeline
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    /// Empty timeline with a single track "V1".
    pub fn new() -> Self {
        Self::with_config(TimelineConfig::default())
    }

    pub fn with_config(config: TimelineConfig) -> Self {
        Self {
            tracks: vec![Track::new("V1")],
            playhead: ProgramTime::ZERO,
            zoom: 1.0,
            program_duration: RationalTime::ZERO,
            history: UndoStack::new(config.undo_depth),
            config,
            listeners: Vec::new(),
        }
    }

    /// Replace the editing constants. Trims the edit history if it shrank.
    pub fn set_config(&mut self, config: TimelineConfig) {
        self.history.set_max_depth(config.undo_depth);
        self.config = config;
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Track 0.
    pub fn program_track(&self) -> &Track {
        &self.tracks[0]
    }

    pub fn program_clips(&self) -> &[ClipInstance] {
        self.program_track().clips()
    }

    /// Authoritative playback position.
    pub fn playhead(&self) -> ProgramTime {
        self.playhead
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Longest active duration over all tracks.
    pub fn program_duration(&self) -> RationalTime {
        self.program_duration
    }

    /// The playhead in placement coordinates on the program track.
    pub fn playhead_placement(&self) -> PlacementTime {
        translate::program_to_placement(self.program_clips(), self.playhead)
    }

    /// Find an instance and the track holding it.
    pub fn find_instance(&self, id: InstanceId) -> Option<(TrackId, &ClipInstance)> {
        self.tracks
            .iter()
            .find_map(|t| t.get(id).map(|clip| (t.id, clip)))
    }

    pub(crate) fn locate(&self, id: InstanceId) -> Result<(usize, usize)> {
        self.tracks
            .iter()
            .enumerate()
            .find_map(|(ti, t)| t.find_clip(id).map(|ci| (ti, ci)))
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {id}")))
    }

    pub(crate) fn track_index(&self, id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CutlineError::NotFound(format!("track {id}")))
    }

    /// Whether every track satisfies the placement invariant.
    pub fn is_placement_consistent(&self) -> bool {
        self.tracks.iter().all(Track::is_placement_consistent)
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            tracks: self.tracks.clone(),
            playhead: self.playhead,
            zoom: self.zoom,
            program_duration: self.program_duration,
        }
    }

    /// Ordered active segments of the program track, ready for an encoder.
    pub fn export_segments(&self, registry: &ClipRegistry) -> Result<Vec<ExportSegment>> {
        translate::export_segments(self.program_clips(), registry)
    }

    // ── Clip operations ─────────────────────────────────────────

    /// Append a placement of `source`. Default trim is the whole source.
    pub fn add_clip(
        &mut self,
        track_id: TrackId,
        source: &SourceClip,
        trim: Option<(RationalTime, RationalTime)>,
    ) -> Result<InstanceId> {
        let instance = match trim {
            Some((start, end)) => ClipInstance::with_trim(source, start, end)?,
            None => ClipInstance::from_source(source),
        };
        let index = self.track(track_id).map(Track::len).unwrap_or(0);
        self.insert_clip(track_id, index, instance)
    }

    /// Insert a prepared instance at `index` (clamped to the track length).
    pub fn insert_clip(
        &mut self,
        track_id: TrackId,
        index: usize,
        instance: ClipInstance,
    ) -> Result<InstanceId> {
        let ti = self.track_index(track_id)?;
        validate_trim(instance.trim_start, instance.trim_end, instance.own_duration)?;
        if self.locate(instance.instance_id).is_ok() {
            return Err(CutlineError::validation(format!(
                "clip instance {} already placed",
                instance.instance_id
            )));
        }
        let id = instance.instance_id;
        self.tracks[ti].insert(index, instance);
        self.recompute(&[ti]);
        debug!(instance = %id, track = %track_id, index, "Clip added");
        self.emit(TimelineEvent::Edited);
        Ok(id)
    }

    /// Delete an instance. The playhead only moves if it now lies past the
    /// end of the program.
    pub fn remove_clip(&mut self, id: InstanceId) -> Result<ClipInstance> {
        let (ti, ci) = self.locate(id)?;
        let removed = self.tracks[ti]
            .remove(ci)
            .ok_or_else(|| CutlineError::NotFound(format!("clip instance {id}")))?;
        self.recompute(&[ti]);
        debug!(instance = %id, "Clip removed");
        self.emit(TimelineEvent::Edited);
        Ok(removed)
    }

    /// Split an instance at `at`, measured in its track's cumulative active
    /// time. Both sides must keep at least the minimum active duration.
    ///
    /// The original becomes the left fragment and keeps its id. Both
    /// fragments record their true span in the source clock.
    pub fn split_clip(&mut self, id: InstanceId, at: ProgramTime) -> Result<(InstanceId, InstanceId)> {
        let (ti, ci) = self.locate(id)?;
        let epsilon = self.config.min_active_duration();
        let clip = &self.tracks[ti].clips()[ci];
        let offset = at - translate::cumulative_offset(clip);
        let active = clip.active_duration();
        if offset < epsilon || active - offset < epsilon {
            return Err(CutlineError::validation(format!(
                "split point {at} too close to the edges of {id}"
            )));
        }

        let cut = clip.source_at(offset);
        let mut left = clip.clone();
        left.own_duration = offset;
        left.trim_start = RationalTime::ZERO;
        left.trim_end = offset;
        left.source_offset = Some(SourceSpan {
            start: clip.source_in(),
            end: cut,
        });

        let mut right = clip.clone();
        right.instance_id = InstanceId::new();
        right.own_duration = active - offset;
        right.trim_start = RationalTime::ZERO;
        right.trim_end = active - offset;
        right.source_offset = Some(SourceSpan {
            start: cut,
            end: clip.source_out(),
        });
        let right_id = right.instance_id;

        let track = &mut self.tracks[ti];
        if let Some(slot) = track.clip_mut(ci) {
            *slot = left;
        }
        track.insert(ci + 1, right);
        self.recompute(&[ti]);
        debug!(instance = %id, right = %right_id, at = %at, "Clip split");
        self.emit(TimelineEvent::Edited);
        Ok((id, right_id))
    }

    // ── Playhead and zoom ───────────────────────────────────────

    /// Move the playhead, clamped to `[0, program_duration]`.
    /// Returns the position actually stored.
    pub fn set_playhead(&mut self, position: ProgramTime) -> Result<ProgramTime> {
        if position < ProgramTime::ZERO {
            return Err(CutlineError::validation(format!(
                "negative playhead position {position}"
            )));
        }
        let clamped = position.min(ProgramTime::new(self.program_duration));
        if clamped != self.playhead {
            self.playhead = clamped;
            self.emit(TimelineEvent::PlayheadChanged { position: clamped });
        }
        Ok(clamped)
    }

    /// Set the zoom level. Use [`crate::Viewport::set_zoom`] to keep the
    /// playhead anchored on screen.
    pub fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(CutlineError::validation(format!("invalid zoom level {zoom}")));
        }
        self.zoom = zoom;
        Ok(())
    }

    // ── Tracks ──────────────────────────────────────────────────

    pub fn add_track(&mut self, name: impl Into<String>) -> TrackId {
        let track = Track::new(name);
        let id = track.id;
        self.tracks.push(track);
        self.emit(TimelineEvent::Edited);
        id
    }

    /// Remove a track and its instances. The last track cannot be removed.
    pub fn remove_track(&mut self, id: TrackId) -> Result<Track> {
        let ti = self.track_index(id)?;
        if self.tracks.len() == 1 {
            return Err(CutlineError::validation("cannot remove the last track"));
        }
        let track = self.tracks.remove(ti);
        self.recompute(&[]);
        self.emit(TimelineEvent::Edited);
        Ok(track)
    }

    /// Destroy every instance on a track.
    pub fn clear_track(&mut self, id: TrackId) -> Result<Vec<ClipInstance>> {
        let ti = self.track_index(id)?;
        let removed = self.tracks[ti].clear();
        self.recompute(&[ti]);
        self.emit(TimelineEvent::Edited);
        Ok(removed)
    }

    /// Remove every instance referring to `source` on every track.
    ///
    /// Not undoable: the edit history is dropped, since any earlier
    /// snapshot may still hold instances of the source.
    pub fn remove_source(&mut self, source: SourceClipId) -> usize {
        self.history.clear();
        let mut touched = Vec::new();
        let mut removed = 0;
        for (ti, track) in self.tracks.iter_mut().enumerate() {
            let n = track.remove_source(source);
            if n > 0 {
                touched.push(ti);
                removed += n;
            }
        }
        if removed > 0 {
            self.recompute(&touched);
            self.emit(TimelineEvent::Edited);
        }
        removed
    }

    // ── Change stream ───────────────────────────────────────────

    /// Receive playhead, selection and edit notifications.
    pub fn subscribe(&mut self) -> Receiver<TimelineEvent> {
        let (tx, rx) = unbounded();
        self.listeners.push(tx);
        rx
    }

    /// Announce a selection.
    pub fn select(&mut self, id: InstanceId) -> Result<()> {
        self.locate(id)?;
        self.emit(TimelineEvent::ClipSelected { instance_id: id });
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: TimelineEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    // ── Derived state ───────────────────────────────────────────

    /// Re-walk `touched` tracks, then refresh the program duration and
    /// clamp the playhead into it.
    pub(crate) fn recompute(&mut self, touched: &[usize]) {
        for &ti in touched {
            if let Some(track) = self.tracks.get_mut(ti) {
                track.recompute_placement();
            }
        }
        self.program_duration = self
            .tracks
            .iter()
            .map(Track::active_duration)
            .max()
            .unwrap_or(RationalTime::ZERO);
        self.clamp_playhead();
    }

    fn clamp_playhead(&mut self) {
        let end = ProgramTime::new(self.program_duration);
        if self.playhead > end {
            self.playhead = end;
            self.emit(TimelineEvent::PlayheadChanged { position: end });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: i64) -> RationalTime {
        RationalTime::from_secs(s)
    }

    fn source(own: i64) -> SourceClip {
        SourceClip::new("clip.mp4", secs(own))
    }

    #[test]
    fn test_new_timeline_has_one_track() {
        let timeline = Timeline::new();
        assert_eq!(timeline.tracks().len(), 1);
        assert_eq!(timeline.program_track().name, "V1");
        assert_eq!(timeline.program_duration(), RationalTime::ZERO);
        assert_eq!(timeline.zoom(), 1.0);
    }

    #[test]
    fn test_add_clip_default_and_explicit_trim() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        let a = timeline
            .add_clip(track, &source(30), Some((secs(5), secs(15))))
            .unwrap();
        let b = timeline.add_clip(track, &source(10), None).unwrap();

        let (_, a) = timeline.find_instance(a).unwrap();
        assert_eq!(a.start_time, PlacementTime::ZERO);
        let (_, b) = timeline.find_instance(b).unwrap();
        assert_eq!(b.start_time, PlacementTime::from_secs(10));
        assert_eq!(b.trim_end, secs(10));
        assert_eq!(timeline.program_duration(), secs(20));
    }

    #[test]
    fn test_add_clip_invalid_trim_leaves_model() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        let err = timeline
            .add_clip(track, &source(10), Some((secs(8), secs(3))))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(timeline.program_track().is_empty());

        let err = timeline.add_clip(TrackId::new(), &source(10), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_remove_clip_keeps_playhead_unless_past_end() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        let a = timeline.add_clip(track, &source(10), None).unwrap();
        let b = timeline.add_clip(track, &source(10), None).unwrap();
        timeline.set_playhead(ProgramTime::from_secs(5)).unwrap();

        timeline.remove_clip(a).unwrap();
        assert_eq!(timeline.playhead(), ProgramTime::from_secs(5));
        assert_eq!(timeline.program_clips()[0].start_time, PlacementTime::ZERO);

        timeline.set_playhead(ProgramTime::from_secs(9)).unwrap();
        timeline.remove_clip(b).unwrap();
        assert_eq!(timeline.playhead(), ProgramTime::ZERO);
        assert!(timeline.remove_clip(b).unwrap_err().is_validation());
    }

    #[test]
    fn test_split_clip() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        timeline.add_clip(track, &source(4), None).unwrap();
        let id = timeline
            .add_clip(track, &source(30), Some((secs(5), secs(25))))
            .unwrap();
        let before = timeline.program_duration();

        // Clip starts at program 4; split 6s into its active region.
        let (left, right) = timeline.split_clip(id, ProgramTime::from_secs(10)).unwrap();
        assert_eq!(left, id);
        assert_eq!(timeline.program_duration(), before);
        assert!(timeline.is_placement_consistent());

        let clips = timeline.program_clips();
        assert_eq!(clips.len(), 3);
        assert_eq!(clips[1].own_duration, secs(6));
        assert_eq!(clips[1].source_in().as_rational(), secs(5));
        assert_eq!(clips[2].instance_id, right);
        assert_eq!(clips[2].source_in().as_rational(), secs(11));
        assert_eq!(clips[2].source_out().as_rational(), secs(25));
        assert_eq!(clips[2].start_time, PlacementTime::from_secs(10));
        assert_eq!(clips[1].source_clip_id, clips[2].source_clip_id);
    }

    #[test]
    fn test_split_rejects_edges() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        let id = timeline.add_clip(track, &source(10), None).unwrap();
        let near_start = ProgramTime::new(RationalTime::from_millis(50));
        assert!(timeline.split_clip(id, near_start).unwrap_err().is_validation());
        assert!(timeline.split_clip(id, ProgramTime::from_secs(10)).is_err());
        assert_eq!(timeline.program_clips().len(), 1);
    }

    #[test]
    fn test_set_playhead_clamps_and_rejects_negative() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        timeline.add_clip(track, &source(10), None).unwrap();
        assert_eq!(
            timeline.set_playhead(ProgramTime::from_secs(50)).unwrap(),
            ProgramTime::from_secs(10)
        );
        assert!(timeline.set_playhead(ProgramTime::from_secs(-1)).is_err());
        assert_eq!(timeline.playhead(), ProgramTime::from_secs(10));
    }

    #[test]
    fn test_program_duration_is_max_over_tracks() {
        let mut timeline = Timeline::new();
        let v1 = timeline.program_track().id;
        let v2 = timeline.add_track("V2");
        timeline.add_clip(v1, &source(5), None).unwrap();
        timeline.add_clip(v2, &source(12), None).unwrap();
        assert_eq!(timeline.program_duration(), secs(12));

        timeline.clear_track(v2).unwrap();
        assert_eq!(timeline.program_duration(), secs(5));
        timeline.remove_track(v2).unwrap();
        assert!(timeline.remove_track(v1).unwrap_err().is_validation());
    }

    #[test]
    fn test_subscribe_receives_events() {
        let mut timeline = Timeline::new();
        let rx = timeline.subscribe();
        let dropped = timeline.subscribe();
        drop(dropped);

        let track = timeline.program_track().id;
        let id = timeline.add_clip(track, &source(10), None).unwrap();
        timeline.set_playhead(ProgramTime::from_secs(3)).unwrap();
        timeline.select(id).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                TimelineEvent::Edited,
                TimelineEvent::PlayheadChanged {
                    position: ProgramTime::from_secs(3)
                },
                TimelineEvent::ClipSelected { instance_id: id },
            ]
        );
        assert_eq!(timeline.listeners.len(), 1);
    }

    #[test]
    fn test_zoom_validation() {
        let mut timeline = Timeline::new();
        assert!(timeline.set_zoom(0.0).is_err());
        assert!(timeline.set_zoom(f64::NAN).is_err());
        timeline.set_zoom(2.5).unwrap();
        assert_eq!(timeline.zoom(), 2.5);
    }

    #[test]
    fn test_deserialize_rebuilds_derived_state() {
        let mut timeline = Timeline::new();
        let track = timeline.program_track().id;
        timeline
            .add_clip(track, &source(30), Some((secs(5), secs(15))))
            .unwrap();
        timeline.add_clip(track, &source(10), None).unwrap();
        timeline.set_playhead(ProgramTime::from_secs(12)).unwrap();

        let json = serde_json::to_string(&timeline).unwrap();
        let loaded: Timeline = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.program_duration(), secs(20));
        assert_eq!(loaded.playhead(), ProgramTime::from_secs(12));
        assert_eq!(loaded.tracks(), timeline.tracks());
    }
}
