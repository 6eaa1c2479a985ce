//! Edit operations with undo/redo support.
//!
//! Each applied [`TimelineEdit`] records the track set as it was before the
//! edit. Undo and redo swap whole track sets, then rebuild placement, so
//! they cannot drift from what the forward operation produced.

use cutline_core::{PlacementTime, ProgramTime, RationalTime, Result};
use smallvec::{smallvec, SmallVec};
use tracing::debug;

use crate::clip::ClipInstance;
use crate::id::{InstanceId, TrackId};
use crate::placement::TrimHandle;
use crate::timeline::{Timeline, TimelineEvent};
use crate::track::Track;

/// Instances created or changed by an edit.
pub type Affected = SmallVec<[InstanceId; 2]>;

/// A recordable edit on the timeline.
#[derive(Debug, Clone)]
pub enum TimelineEdit {
    /// Append a prepared instance to a track.
    AddClip {
        track_id: TrackId,
        instance: ClipInstance,
    },
    RemoveClip {
        instance_id: InstanceId,
    },
    Trim {
        instance_id: InstanceId,
        handle: TrimHandle,
        delta: RationalTime,
    },
    Reposition {
        instance_id: InstanceId,
        from_track: TrackId,
        to_track: TrackId,
        target_time: PlacementTime,
    },
    Split {
        instance_id: InstanceId,
        at: ProgramTime,
    },
}

impl Timeline {
    /// Run an edit and record it for undo. A failed edit records nothing and
    /// leaves the model as it was; an edit that changes nothing is not
    /// recorded either.
    pub fn apply(&mut self, edit: TimelineEdit) -> Result<Affected> {
        let before = self.tracks.clone();
        let affected: Affected = match edit {
            TimelineEdit::AddClip { track_id, instance } => {
                let index = self.track(track_id).map(Track::len).unwrap_or(0);
                smallvec![self.insert_clip(track_id, index, instance)?]
            }
            TimelineEdit::RemoveClip { instance_id } => {
                self.remove_clip(instance_id)?;
                smallvec![instance_id]
            }
            TimelineEdit::Trim {
                instance_id,
                handle,
                delta,
            } => {
                self.trim(instance_id, handle, delta)?;
                smallvec![instance_id]
            }
            TimelineEdit::Reposition {
                instance_id,
                from_track,
                to_track,
                target_time,
            } => {
                self.reposition(instance_id, from_track, to_track, target_time)?;
                smallvec![instance_id]
            }
            TimelineEdit::Split { instance_id, at } => {
                let (left, right) = self.split_clip(instance_id, at)?;
                smallvec![left, right]
            }
        };
        if self.tracks != before {
            self.history.push(before);
        }
        Ok(affected)
    }

    /// Restore the track set before the last applied edit.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.undo(&self.tracks) else {
            return false;
        };
        self.restore(previous);
        debug!(remaining = self.history.undo_count(), "Undo");
        true
    }

    /// Re-apply the last undone edit.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(&self.tracks) else {
            return false;
        };
        self.restore(next);
        debug!(remaining = self.history.redo_count(), "Redo");
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn restore(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        let touched: Vec<usize> = (0..self.tracks.len()).collect();
        self.recompute(&touched);
        self.emit(TimelineEvent::Edited);
    }
}

// ── Undo stack ──────────────────────────────────────────────────

/// Bounded undo/redo history of track sets.
#[derive(Debug, Clone)]
pub struct UndoStack {
    /// States before each applied edit (most recent last).
    undo: Vec<Vec<Track>>,
    /// States before each undo (most recent last).
    redo: Vec<Vec<Track>>,
    /// Maximum history depth.
    max_depth: usize,
}

impl UndoStack {
    /// Create a new undo stack with the given maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record the state before an edit. Clears the redo stack.
    pub fn push(&mut self, before: Vec<Track>) {
        self.redo.clear();
        self.undo.push(before);
        self.trim_to_depth();
    }

    /// Pop the state to restore, saving `current` for redo.
    pub fn undo(&mut self, current: &[Track]) -> Option<Vec<Track>> {
        let previous = self.undo.pop()?;
        self.redo.push(current.to_vec());
        Some(previous)
    }

    /// Pop the state to re-apply, saving `current` for undo.
    pub fn redo(&mut self, current: &[Track]) -> Option<Vec<Track>> {
        let next = self.redo.pop()?;
        self.undo.push(current.to_vec());
        Some(next)
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth.max(1);
        self.trim_to_depth();
    }

    fn trim_to_depth(&mut self) {
        if self.undo.len() > self.max_depth {
            let excess = self.undo.len() - self.max_depth;
            self.undo.drain(..excess);
        }
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(200)
    }
}

// ── Tests ───────────────────────────────────────────────────────
