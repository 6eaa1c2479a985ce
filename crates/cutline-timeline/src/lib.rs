//! Cutline Timeline - the authoring model and its time domains
//!
//! - Clip registry of imported source media
//! - Tracks of clip instances with cumulative active placement
//! - Placement engine: reposition, snapping, trim
//! - Translation between program, placement and source time
//! - Viewport pixel mapping, pointer sessions, undo/redo, persistence

pub mod clip;
pub mod edit;
pub mod id;
pub mod placement;
pub mod project;
pub mod registry;
pub mod serialization;
pub mod session;
pub mod timeline;
pub mod track;
pub mod translate;
pub mod viewport;

pub use clip::{ClipInstance, SourceSpan};
pub use edit::{Affected, TimelineEdit, UndoStack};
pub use id::{InstanceId, SourceClipId, TrackId};
pub use placement::{SnapResult, TrimHandle};
pub use project::Project;
pub use registry::{ClipRegistry, SourceClip};
pub use serialization::ProjectFile;
pub use session::{DragSession, TrimSession};
pub use timeline::{Timeline, TimelineEvent, TimelineSnapshot};
pub use track::Track;
pub use translate::ProgramLocation;
pub use viewport::Viewport;
