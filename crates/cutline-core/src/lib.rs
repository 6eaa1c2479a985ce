//! Cutline Core - Foundation types for the timeline engine
//!
//! This crate provides the fundamental types used throughout Cutline:
//! - Time representation (RationalTime, FrameRate, TimeRange)
//! - The three time domains (ProgramTime, PlacementTime, SourceTime)
//! - Error taxonomy
//! - Engine configuration

pub mod config;
pub mod error;
pub mod time;

pub use config::{EngineConfig, PlaybackConfig, TimelineConfig, ViewportConfig};
pub use error::{CutlineError, Result};
pub use time::{FrameRate, PlacementTime, ProgramTime, RationalTime, SourceTime, TimeRange};
