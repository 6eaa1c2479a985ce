//! Clip instances placed on a track.

use cutline_core::{CutlineError, PlacementTime, RationalTime, Result, SourceTime};
use serde::{Deserialize, Serialize};

use crate::id::{InstanceId, SourceClipId};
use crate::registry::SourceClip;

/// The true span of a split fragment in its source's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceTime,
    pub end: SourceTime,
}

/// One placement of a source clip on a track.
///
/// `own_duration`, `trim_start` and `trim_end` are relative to the span this
/// instance represents: the whole source for a normal placement, the
/// fragment for a split. `0 <= trim_start < trim_end <= own_duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInstance {
    pub instance_id: InstanceId,
    pub source_clip_id: SourceClipId,
    /// Clip name (displayed in UI)
    pub name: String,
    pub own_duration: RationalTime,
    pub trim_start: RationalTime,
    pub trim_end: RationalTime,
    /// Present only on split fragments.
    pub source_offset: Option<SourceSpan>,
    /// Sum of the active durations of the preceding instances on the track.
    pub start_time: PlacementTime,
}

impl ClipInstance {
    /// Place the whole of `source`.
    pub fn from_source(source: &SourceClip) -> Self {
        Self {
            instance_id: InstanceId::new(),
            source_clip_id: source.id,
            name: source.display_name(),
            own_duration: source.full_duration,
            trim_start: RationalTime::ZERO,
            trim_end: source.full_duration,
            source_offset: None,
            start_time: PlacementTime::ZERO,
        }
    }

    /// Place `source` with an initial active region.
    pub fn with_trim(
        source: &SourceClip,
        trim_start: RationalTime,
        trim_end: RationalTime,
    ) -> Result<Self> {
        validate_trim(trim_start, trim_end, source.full_duration)?;
        Ok(Self {
            trim_start,
            trim_end,
            ..Self::from_source(source)
        })
    }

    /// Length of the played region.
    #[inline]
    pub fn active_duration(&self) -> RationalTime {
        self.trim_end - self.trim_start
    }

    /// End of the full visual span.
    #[inline]
    pub fn placement_end(&self) -> PlacementTime {
        self.start_time + self.own_duration
    }

    #[inline]
    pub fn active_start(&self) -> PlacementTime {
        self.start_time + self.trim_start
    }

    #[inline]
    pub fn active_end(&self) -> PlacementTime {
        self.start_time + self.trim_end
    }

    pub fn is_split(&self) -> bool {
        self.source_offset.is_some()
    }

    /// Source time of the first active frame.
    pub fn source_in(&self) -> SourceTime {
        match self.source_offset {
            Some(span) => span.start + self.trim_start,
            None => SourceTime::new(self.trim_start),
        }
    }

    /// Source time of the end of the active region.
    pub fn source_out(&self) -> SourceTime {
        self.source_in() + self.active_duration()
    }

    /// Source time at `offset` into the active region.
    pub fn source_at(&self, offset: RationalTime) -> SourceTime {
        self.source_in() + offset
    }

    /// Offset into the active region of a source time reported by a surface.
    pub fn offset_of(&self, source: SourceTime) -> RationalTime {
        source - self.source_in()
    }
}

/// Check `0 <= trim_start < trim_end <= own_duration`.
pub fn validate_trim(
    trim_start: RationalTime,
    trim_end: RationalTime,
    own_duration: RationalTime,
) -> Result<()> {
    if trim_start.is_negative() || trim_start >= trim_end || trim_end > own_duration {
        return Err(CutlineError::validation(format!(
            "invalid trim [{trim_start}, {trim_end}] for duration {own_duration}"
        )));
    }
    Ok(())
}
