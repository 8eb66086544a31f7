use serde::{Deserialize, Serialize};

use crate::error::StretchError;

/// Default WSOLA window length in samples.
pub const DEFAULT_WINDOW_SIZE: usize = 2048;
/// Default analysis hop (input advance per frame) in samples.
pub const DEFAULT_ANALYSIS_HOP: usize = 1024;
/// Default search radius around the nominal input position.
pub const DEFAULT_SEARCH_RADIUS: usize = 512;
/// Overlaps shorter than this give unusable similarity estimates.
pub const DEFAULT_MIN_OVERLAP: usize = 64;
/// Factors closer than this to 1.0 are treated as identity.
pub const DEFAULT_IDENTITY_EPSILON: f32 = 0.001;

/// How a segment's length is changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StretchMode {
    /// Cubic resampling. Pitch shifts with the length change.
    SimpleInterpolation,
    /// WSOLA overlap-add. Pitch is kept.
    #[default]
    PitchPreserving,
}

impl StretchMode {
    /// Maps the boolean switch used by the marker engine onto a mode.
    #[inline]
    pub fn from_preserve_pitch(preserve_pitch: bool) -> Self {
        if preserve_pitch {
            Self::PitchPreserving
        } else {
            Self::SimpleInterpolation
        }
    }
}

/// WSOLA frame layout and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsolaConfig {
    /// Window length in samples.
    pub window_size: usize,
    /// Input advance per frame in samples.
    pub analysis_hop: usize,
    /// Candidates are searched within ±this many samples of the nominal position.
    pub search_radius: usize,
    /// Below this overlap length the processor falls back to interpolation.
    pub min_overlap: usize,
    /// |factor − 1| below this returns the input unchanged.
    pub identity_epsilon: f32,
}

impl Default for WsolaConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            analysis_hop: DEFAULT_ANALYSIS_HOP,
            search_radius: DEFAULT_SEARCH_RADIUS,
            min_overlap: DEFAULT_MIN_OVERLAP,
            identity_epsilon: DEFAULT_IDENTITY_EPSILON,
        }
    }
}

impl WsolaConfig {
    /// Set the window length.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the analysis hop.
    pub fn with_analysis_hop(mut self, analysis_hop: usize) -> Self {
        self.analysis_hop = analysis_hop;
        self
    }

    /// Set the search radius.
    pub fn with_search_radius(mut self, search_radius: usize) -> Self {
        self.search_radius = search_radius;
        self
    }

    /// Set the minimum usable overlap.
    pub fn with_min_overlap(mut self, min_overlap: usize) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    /// Output hop for a given factor: `round(analysis_hop * factor)`.
    #[inline]
    pub fn synthesis_hop(&self, factor: f32) -> usize {
        (self.analysis_hop as f64 * factor as f64).round().max(0.0) as usize
    }

    /// Overlap between consecutive output frames, or `None` when the output
    /// hop is at least as long as the window.
    #[inline]
    pub fn overlap(&self, factor: f32) -> Option<usize> {
        self.window_size.checked_sub(self.synthesis_hop(factor))
    }

    /// Smallest input the WSOLA path accepts; shorter input is interpolated.
    #[inline]
    pub fn min_input_len(&self) -> usize {
        self.window_size * 2
    }

    /// Checks the frame layout is usable.
    pub fn validate(&self) -> Result<(), StretchError> {
        if self.window_size < 2 {
            return Err(StretchError::InvalidOptions(format!(
                "window size {} is too small",
                self.window_size
            )));
        }
        if self.analysis_hop == 0 || self.analysis_hop >= self.window_size {
            return Err(StretchError::InvalidOptions(format!(
                "analysis hop {} must be in 1..{}",
                self.analysis_hop, self.window_size
            )));
        }
        if !self.identity_epsilon.is_finite() || self.identity_epsilon < 0.0 {
            return Err(StretchError::InvalidOptions(format!(
                "identity epsilon {} must be non-negative",
                self.identity_epsilon
            )));
        }
        Ok(())
    }
}
