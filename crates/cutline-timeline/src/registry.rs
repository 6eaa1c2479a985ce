//! Clip registry: the catalog of imported source media.
//!
//! Records are immutable once registered. Timeline instances refer to them
//! by [`SourceClipId`] and never copy them.

use cutline_core::{CutlineError, RationalTime, Result};
use cutline_media::{MediaInfo, MediaProbe};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::id::SourceClipId;

/// An imported media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClip {
    pub id: SourceClipId,
    pub file_path: PathBuf,
    /// Duration as probed
    pub full_duration: RationalTime,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub codec: String,
    pub bitrate: u64,
    pub thumbnail_path: Option<PathBuf>,
    /// Whether the file carries an audio stream.
    #[serde(default = "default_has_audio")]
    pub has_audio: bool,
}

fn default_has_audio() -> bool {
    true
}

impl SourceClip {
    /// Build a record from probe output.
    pub fn from_info(path: impl Into<PathBuf>, info: MediaInfo, thumbnail: Option<PathBuf>) -> Self {
        Self {
            id: SourceClipId::new(),
            file_path: path.into(),
            full_duration: info.duration,
            width: info.width,
            height: info.height,
            file_size: info.file_size,
            codec: info.codec,
            bitrate: info.bitrate,
            thumbnail_path: thumbnail,
            has_audio: info.has_audio,
        }
    }

    /// Minimal record with only a path and duration.
    pub fn new(path: impl Into<PathBuf>, full_duration: RationalTime) -> Self {
        Self {
            id: SourceClipId::new(),
            file_path: path.into(),
            full_duration,
            width: 0,
            height: 0,
            file_size: 0,
            codec: String::new(),
            bitrate: 0,
            thumbnail_path: None,
            has_audio: true,
        }
    }

    /// Display name derived from the file name.
    pub fn display_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Catalog of source clips, in import order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClipRegistry {
    clips: Vec<SourceClip>,
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe `path` and register the result.
    ///
    /// A probe failure aborts the import. A thumbnail failure does not: the
    /// record is registered without one.
    pub fn import(&mut self, probe: &dyn MediaProbe, path: &Path) -> Result<SourceClipId> {
        let info = probe.probe(path)?;
        let thumbnail = match probe.generate_thumbnail(path) {
            Ok(thumb) => Some(thumb),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Thumbnail generation failed");
                None
            }
        };
        let clip = SourceClip::from_info(path, info, thumbnail);
        info!(
            id = %clip.id,
            path = %path.display(),
            duration = %clip.full_duration,
            "Imported media"
        );
        self.register(clip)
    }

    /// Add an already-built record.
    pub fn register(&mut self, clip: SourceClip) -> Result<SourceClipId> {
        if clip.full_duration <= RationalTime::ZERO {
            return Err(CutlineError::validation(format!(
                "source {} has non-positive duration",
                clip.file_path.display()
            )));
        }
        if self.get(clip.id).is_some() {
            return Err(CutlineError::validation(format!(
                "source {} already registered",
                clip.id
            )));
        }
        let id = clip.id;
        self.clips.push(clip);
        Ok(id)
    }

    pub fn get(&self, id: SourceClipId) -> Option<&SourceClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    /// Look up a record, failing with `NotFound`.
    pub fn require(&self, id: SourceClipId) -> Result<&SourceClip> {
        self.get(id)
            .ok_or_else(|| CutlineError::NotFound(format!("source clip {id}")))
    }

    pub(crate) fn remove(&mut self, id: SourceClipId) -> Option<SourceClip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceClip> {
        self.clips.iter()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}
