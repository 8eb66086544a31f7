//! Timeline markers: the stretch-relevant data plus view-side drag state.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::core::time::{ms_to_samples, samples_to_ms};

/// A timeline anchor with its current and pre-stretch sample positions.
///
/// `time_ms` and `original_time_ms` are derived values. They are refreshed
/// only by [`MarkerData::update_time_from_samples`] (or the reverse
/// conversion), never implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerData {
    pub position: i64,
    pub original_position: i64,
    pub time_ms: i64,
    pub original_time_ms: i64,
    /// Fixed markers cannot be dragged but still split stretch segments.
    pub is_fixed: bool,
    /// The single trailing marker of a timeline.
    pub is_end_marker: bool,
}

impl MarkerData {
    /// Movable marker at `position`, with matching original position.
    pub fn new(position: i64, sample_rate: u32) -> Self {
        let mut marker = Self {
            position,
            original_position: position,
            ..Default::default()
        };
        marker.update_time_from_samples(sample_rate);
        marker
    }

    /// Marker that cannot be dragged.
    pub fn fixed(position: i64, sample_rate: u32) -> Self {
        Self {
            is_fixed: true,
            ..Self::new(position, sample_rate)
        }
    }

    /// Fixed end-of-timeline marker.
    pub fn end(position: i64, sample_rate: u32) -> Self {
        Self {
            is_end_marker: true,
            ..Self::fixed(position, sample_rate)
        }
    }

    /// Moves the marker, keeping its original position.
    pub fn with_position(mut self, position: i64, sample_rate: u32) -> Self {
        self.position = position;
        self.update_time_from_samples(sample_rate);
        self
    }

    pub fn update_time_from_samples(&mut self, sample_rate: u32) {
        self.time_ms = samples_to_ms(self.position, sample_rate as i64);
        self.original_time_ms = samples_to_ms(self.original_position, sample_rate as i64);
    }

    pub fn update_samples_from_time(&mut self, sample_rate: u32) {
        self.position = ms_to_samples(self.time_ms, sample_rate as i64);
        self.original_position = ms_to_samples(self.original_time_ms, sample_rate as i64);
    }

    /// Signed distance the marker has been dragged from its original spot.
    #[inline]
    pub fn displacement(&self) -> i64 {
        self.position - self.original_position
    }
}

/// Pointer-drag bookkeeping owned by the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragState {
    pub is_dragging: bool,
    /// Pointer x in pixels when the drag began.
    pub drag_start_x: i32,
    pub drag_start_sample: i64,
}

/// [`MarkerData`] plus [`DragState`]; derefs to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Marker {
    pub data: MarkerData,
    pub drag: DragState,
}

impl Marker {
    pub fn new(position: i64, sample_rate: u32) -> Self {
        MarkerData::new(position, sample_rate).into()
    }

    pub fn fixed(position: i64, sample_rate: u32) -> Self {
        MarkerData::fixed(position, sample_rate).into()
    }

    pub fn end(position: i64, sample_rate: u32) -> Self {
        MarkerData::end(position, sample_rate).into()
    }
}

impl From<MarkerData> for Marker {
    fn from(data: MarkerData) -> Self {
        Self {
            data,
            drag: DragState::default(),
        }
    }
}

impl Deref for Marker {
    type Target = MarkerData;

    fn deref(&self) -> &MarkerData {
        &self.data
    }
}

impl DerefMut for Marker {
    fn deref_mut(&mut self) -> &mut MarkerData {
        &mut self.data
    }
}
