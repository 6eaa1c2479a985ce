//! Cutline Playback - keeps one playback surface in step with the program
//!
//! - Surface contract with generation-stamped load/seek requests
//! - Synchronizer state machine: loads, seamless transitions, end of program
//! - Scrub seek throttling and coalesced playhead progress

pub mod scrub;
pub mod state;
pub mod surface;
pub mod synchronizer;

pub use scrub::{ProgressCoalescer, ScrubThrottle};
pub use state::{PlaybackCommand, PlaybackEvent, PlaybackEvents, PlaybackState};
pub use surface::{Generation, PlaybackSurface, RecordingSurface, SurfaceCall};
pub use synchronizer::PlaybackSynchronizer;
