//! Engine configuration.
//!
//! JSON on disk, every field defaulted, so an empty object (or no file at
//! all) yields the stock editing behaviour.

use crate::error::{CutlineError, Result};
use crate::time::RationalTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the timeline engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub timeline: TimelineConfig,
    pub playback: PlaybackConfig,
    pub viewport: ViewportConfig,
}

/// Editing constants used by the placement engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimelineConfig {
    /// Minimum active duration a trim may leave behind.
    pub min_active_duration_secs: f64,
    /// Distance within which a dragged edge snaps to a neighbour.
    pub snap_threshold_secs: f64,
    /// Maximum edit history depth.
    pub undo_depth: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            min_active_duration_secs: 0.1,
            snap_threshold_secs: 0.2,
            undo_depth: 200,
        }
    }
}

impl TimelineConfig {
    pub fn min_active_duration(&self) -> RationalTime {
        RationalTime::from_seconds_f64(self.min_active_duration_secs)
    }

    pub fn snap_threshold(&self) -> RationalTime {
        RationalTime::from_seconds_f64(self.snap_threshold_secs)
    }
}

/// Playback synchronizer timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackConfig {
    /// Minimum wall-clock gap between resource seeks while scrubbing.
    pub scrub_seek_interval_ms: u64,
    /// Minimum program-time advance between coalesced progress updates.
    pub progress_interval_ms: u64,
    /// Playhead discrepancy that forces a paused surface to resync.
    pub resync_tolerance_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            scrub_seek_interval_ms: 50,
            progress_interval_ms: 20,
            resync_tolerance_secs: 0.1,
        }
    }
}

impl PlaybackConfig {
    pub fn scrub_seek_interval(&self) -> Duration {
        Duration::from_millis(self.scrub_seek_interval_ms)
    }

    pub fn progress_interval(&self) -> RationalTime {
        RationalTime::from_millis(self.progress_interval_ms as i64)
    }

    pub fn resync_tolerance(&self) -> RationalTime {
        RationalTime::from_seconds_f64(self.resync_tolerance_secs)
    }
}

/// Pixel mapping for the timeline view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewportConfig {
    /// Floor for the pixels-per-second scale.
    pub min_pixels_per_second: f64,
    /// Fixed width of the track label column left of the clips.
    pub label_gutter_px: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_pixels_per_second: 0.1,
            label_gutter_px: 120.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| CutlineError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CutlineError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    /// Load from an explicit path. The file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Load from `path` if given, else from the default location if a file
    /// exists there, else fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// `<config dir>/cutline/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cutline").join("config.json"))
    }

    fn validate(&self) -> Result<()> {
        let t = &self.timeline;
        if !(t.min_active_duration_secs > 0.0) {
            return Err(CutlineError::Config(
                "timeline.min_active_duration_secs must be positive".into(),
            ));
        }
        if !(t.snap_threshold_secs >= 0.0) {
            return Err(CutlineError::Config(
                "timeline.snap_threshold_secs must not be negative".into(),
            ));
        }
        if t.undo_depth == 0 {
            return Err(CutlineError::Config("timeline.undo_depth must be at least 1".into()));
        }
        let p = &self.playback;
        if p.scrub_seek_interval_ms == 0 || p.progress_interval_ms == 0 {
            return Err(CutlineError::Config(
                "playback intervals must be positive".into(),
            ));
        }
        if !(p.resync_tolerance_secs >= 0.0) {
            return Err(CutlineError::Config(
                "playback.resync_tolerance_secs must not be negative".into(),
            ));
        }
        if !(self.viewport.min_pixels_per_second > 0.0) {
            return Err(CutlineError::Config(
                "viewport.min_pixels_per_second must be positive".into(),
            ));
        }
        Ok(())
    }
}
