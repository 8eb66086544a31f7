//! Marker model, marker-driven stretching, and edit history.

pub mod engine;
pub mod history;
pub mod model;

pub use engine::{
    apply_time_stretch_to_markers, calculate_segments, calculate_stretch_factor, validate_markers,
    MarkerStretchEngine, MarkerStretchResult, SegmentKind, StretchSegment,
};
pub use history::{BeatFixEdit, EditCommand, EditHistory, EditorState, StretchEdit};
pub use model::{DragState, Marker, MarkerData};
