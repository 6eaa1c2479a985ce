//! Playback states, commands and events.

use cutline_core::{ProgramTime, SourceTime};
use cutline_timeline::SourceClipId;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use std::time::Instant;

use crate::surface::Generation;

/// Where the synchronizer is. Indices refer to the program track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Waiting for a resource load to complete.
    Loading { index: usize },
    Playing { index: usize },
    Paused { index: usize },
    Scrubbing,
    Ended,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing { .. })
    }

    /// Instance the state refers to, if any.
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Loading { index } | Self::Playing { index } | Self::Paused { index } => Some(index),
            _ => None,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading { index } => write!(f, "loading({index})"),
            Self::Playing { index } => write!(f, "playing({index})"),
            Self::Paused { index } => write!(f, "paused({index})"),
            Self::Scrubbing => write!(f, "scrubbing"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Input to the synchronizer, from the UI layer or from the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek(ProgramTime),
    BeginScrub { at: Instant },
    /// Pointer moved while scrubbing. `at` is the wall time of the input.
    ScrubTo { position: ProgramTime, at: Instant },
    EndScrub,
    /// The current instance's active end was reached.
    BoundaryCrossed,
    ResourceReady(Generation),
    ResourceFailed { generation: Generation, message: String },
    SeekCompleted(Generation),
    SeekFailed { generation: Generation, message: String },
    /// Surface clock advanced, in the loaded resource's time.
    TimeAdvance(SourceTime),
    /// The loaded resource played to its end.
    SurfaceEnded,
    /// The model playhead was moved by something other than playback.
    PlayheadChanged,
}

/// Output of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlaybackEvent {
    StateChanged(PlaybackState),
    PlayheadMoved(ProgramTime),
    ReloadStarted { index: usize, source: SourceClipId },
    SeamlessTransition { from: usize, to: usize },
    Ended,
    /// A load or seek failed; playback is paused at its last good position.
    Error(String),
}

pub type PlaybackEvents = SmallVec<[PlaybackEvent; 4]>;
