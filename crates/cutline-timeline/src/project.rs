//! Project: a clip registry plus the timeline built from it.

use cutline_core::{EngineConfig, RationalTime, Result};
use cutline_media::{ExportSegment, MediaProbe};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::clip::ClipInstance;
use crate::edit::TimelineEdit;
use crate::id::{InstanceId, SourceClipId, TrackId};
use crate::registry::ClipRegistry;
use crate::timeline::Timeline;

/// An open project.
#[derive(Debug, Serialize, Deserialize)]
pub struct Project {
    /// Project name
    pub name: String,
    pub registry: ClipRegistry,
    pub timeline: Timeline,
}

impl Project {
    /// Create a new empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: ClipRegistry::new(),
            timeline: Timeline::new(),
        }
    }

    /// Apply engine configuration to the timeline.
    pub fn configure(&mut self, config: &EngineConfig) {
        self.timeline.set_config(config.timeline.clone());
    }

    /// Probe and register a media file.
    pub fn import_media(&mut self, probe: &dyn MediaProbe, path: &Path) -> Result<SourceClipId> {
        self.registry.import(probe, path)
    }

    /// Append a registered source to a track as an undoable edit.
    pub fn add_clip(
        &mut self,
        track_id: TrackId,
        source_id: SourceClipId,
        trim: Option<(RationalTime, RationalTime)>,
    ) -> Result<InstanceId> {
        let source = self.registry.require(source_id)?;
        let instance = match trim {
            Some((start, end)) => ClipInstance::with_trim(source, start, end)?,
            None => ClipInstance::from_source(source),
        };
        let id = instance.instance_id;
        self.timeline
            .apply(TimelineEdit::AddClip { track_id, instance })?;
        Ok(id)
    }

    /// Delete a source from the library together with every instance of it.
    /// Returns the number of instances removed.
    pub fn delete_source(&mut self, id: SourceClipId) -> Result<usize> {
        let source = self.registry.require(id)?.file_path.clone();
        let removed = self.timeline.remove_source(id);
        self.registry.remove(id);
        info!(source = %source.display(), instances = removed, "Deleted source");
        Ok(removed)
    }

    /// Ordered active segments of the program track.
    pub fn export_segments(&self) -> Result<Vec<ExportSegment>> {
        self.timeline.export_segments(&self.registry)
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled Project")
    }
}
