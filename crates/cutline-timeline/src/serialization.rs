//! Project documents on disk.
//!
//! A document is the project wrapped in an envelope carrying its schema
//! version. Older layouts are lifted to the current one before parsing.
//! The parsed project is then checked against its own library: placement,
//! playback and export all assume every instance names a registered source
//! and holds a trim its span can contain, and none of them re-check it.

use cutline_core::{CutlineError, RationalTime, Result, SourceTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::clip::{validate_trim, ClipInstance};
use crate::project::Project;
use crate::registry::SourceClip;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around a [`Project`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    pub project: Project,
    /// Cutline version that wrote the document.
    pub app_version: String,
}

impl ProjectFile {
    pub fn new(project: Project) -> Self {
        Self {
            version: SCHEMA_VERSION,
            project,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            CutlineError::Serialization(format!("cannot encode project {:?}: {e}", self.project.name))
        })
    }

    /// Parse a document, upgrading older layouts, and check that its
    /// timeline agrees with its library.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| CutlineError::Serialization(format!("not a JSON document: {e}")))?;
        let file: Self = serde_json::from_value(upgrade(value)?)
            .map_err(|e| CutlineError::Serialization(format!("malformed project document: {e}")))?;
        check_integrity(&file.project)?;
        debug!(
            name = %file.project.name,
            sources = file.project.registry.len(),
            written_by = %file.app_version,
            "Project document loaded"
        );
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read(path)?)
    }
}

// ── Schema upgrades ─────────────────────────────────────────────

/// Declared schema version. A document without an envelope is v0.
fn schema_version(value: &Value) -> Result<u32> {
    match value.get("version") {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| CutlineError::Serialization(format!("bad schema version {v}"))),
    }
}

fn upgrade(mut value: Value) -> Result<Value> {
    let mut version = schema_version(&value)?;
    if version > SCHEMA_VERSION {
        return Err(CutlineError::Serialization(format!(
            "schema version {version} is newer than {SCHEMA_VERSION}"
        )));
    }
    while version < SCHEMA_VERSION {
        value = match version {
            // v0: the bare project object.
            0 => json!({ "version": 1, "project": value, "app_version": "0.0.0" }),
            other => {
                return Err(CutlineError::Serialization(format!(
                    "no upgrade from schema version {other}"
                )))
            }
        };
        version += 1;
        debug!(version, "Upgraded project document");
    }
    Ok(value)
}

// ── Integrity ───────────────────────────────────────────────────

/// Reject a library or timeline that the editing operations could never
/// have produced.
fn check_integrity(project: &Project) -> Result<()> {
    let mut sources = HashSet::new();
    for source in project.registry.iter() {
        if !sources.insert(source.id) {
            return Err(CutlineError::validation(format!(
                "source {} is listed twice",
                source.id
            )));
        }
        if source.full_duration <= RationalTime::ZERO {
            return Err(CutlineError::validation(format!(
                "source {} has non-positive duration",
                source.id
            )));
        }
    }

    let mut instances = HashSet::new();
    for track in project.timeline.tracks() {
        for clip in track.clips() {
            if !instances.insert(clip.instance_id) {
                return Err(CutlineError::validation(format!(
                    "instance {} appears twice",
                    clip.instance_id
                )));
            }
            let source = project.registry.get(clip.source_clip_id).ok_or_else(|| {
                CutlineError::validation(format!(
                    "instance {} on track {:?} refers to unknown source {}",
                    clip.instance_id, track.name, clip.source_clip_id
                ))
            })?;
            check_instance(clip, source)?;
        }
    }
    Ok(())
}

fn check_instance(clip: &ClipInstance, source: &SourceClip) -> Result<()> {
    validate_trim(clip.trim_start, clip.trim_end, clip.own_duration)?;
    let fits = match clip.source_offset {
        None => clip.own_duration == source.full_duration,
        Some(span) => {
            span.start >= SourceTime::ZERO
                && span.end <= SourceTime::new(source.full_duration)
                && span.end - span.start == clip.own_duration
        }
    };
    if !fits {
        return Err(CutlineError::validation(format!(
            "instance {} does not fit inside source {}",
            clip.instance_id, source.id
        )));
    }
    Ok(())
}
