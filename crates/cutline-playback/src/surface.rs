//! The playback surface contract.
//!
//! A surface decodes and presents one media resource at a time. `load` and
//! `seek` are requests: their completion comes back later as a
//! [`PlaybackCommand`](crate::PlaybackCommand) carrying the same
//! [`Generation`], which is how late completions are told apart from
//! current ones.

use cutline_core::SourceTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Validity stamp carried by every load and seek request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single decode/present pipeline.
pub trait PlaybackSurface {
    /// Start loading a resource. Answer with `ResourceReady` or
    /// `ResourceFailed` for `generation`.
    fn load(&mut self, path: &Path, generation: Generation);

    /// Position the loaded resource. Answer with `SeekCompleted` or
    /// `SeekFailed` for `generation`.
    fn seek(&mut self, position: SourceTime, generation: Generation);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;
}

/// A request made to a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Load { path: PathBuf, generation: Generation },
    Seek { position: SourceTime, generation: Generation },
    Play,
    Pause,
}

/// Surface that only records what it was asked to do.
///
/// Used headlessly: the driver reads the calls back and feeds completions
/// into the synchronizer itself.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    calls: Vec<SurfaceCall>,
    paused: bool,
    /// Emulate surfaces that pause themselves when seeked.
    pub pause_on_seek: bool,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            paused: true,
            pause_on_seek: false,
        }
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    /// Drain the recorded calls.
    pub fn take_calls(&mut self) -> Vec<SurfaceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn load_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Load { .. }))
            .count()
    }

    pub fn seek_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Seek { .. }))
            .count()
    }

    /// Generation of the most recent load request.
    pub fn last_load(&self) -> Option<Generation> {
        self.calls.iter().rev().find_map(|c| match c {
            SurfaceCall::Load { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    /// Position and generation of the most recent seek request.
    pub fn last_seek(&self) -> Option<(SourceTime, Generation)> {
        self.calls.iter().rev().find_map(|c| match c {
            SurfaceCall::Seek {
                position,
                generation,
            } => Some((*position, *generation)),
            _ => None,
        })
    }
}

impl PlaybackSurface for RecordingSurface {
    fn load(&mut self, path: &Path, generation: Generation) {
        self.paused = true;
        self.calls.push(SurfaceCall::Load {
            path: path.to_path_buf(),
            generation,
        });
    }

    fn seek(&mut self, position: SourceTime, generation: Generation) {
        if self.pause_on_seek {
            self.paused = true;
        }
        self.calls.push(SurfaceCall::Seek {
            position,
            generation,
        });
    }

    fn play(&mut self) {
        self.paused = false;
        self.calls.push(SurfaceCall::Play);
    }

    fn pause(&mut self) {
        self.paused = true;
        self.calls.push(SurfaceCall::Pause);
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
