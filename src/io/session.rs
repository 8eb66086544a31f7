//! JSON persistence for markers and tempo analysis.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::bpm::{AnalysisResult, BeatInfo};
use crate::error::StretchError;
use crate::markers::history::EditorState;
use crate::markers::model::{Marker, MarkerData};

/// Saved marker layout and tempo for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSession {
    pub sample_rate: u32,
    pub bpm: f64,
    pub markers: Vec<MarkerData>,
    #[serde(default)]
    pub beats: Vec<BeatInfo>,
    #[serde(default)]
    pub grid_start_sample: usize,
}

impl MarkerSession {
    pub fn new(sample_rate: u32, bpm: f64, markers: Vec<MarkerData>) -> Self {
        Self {
            sample_rate,
            bpm,
            markers,
            beats: Vec::new(),
            grid_start_sample: 0,
        }
    }

    /// Captures markers, beats and tempo from an editor state.
    pub fn from_state(state: &EditorState) -> Self {
        Self {
            sample_rate: state.sample_rate,
            bpm: state.bpm,
            markers: state.markers.iter().map(|m| m.data).collect(),
            beats: state.beats.clone(),
            grid_start_sample: state.grid_start_sample,
        }
    }

    /// Adds the beat grid of an analysis.
    pub fn with_analysis(mut self, analysis: &AnalysisResult) -> Self {
        self.bpm = analysis.bpm;
        self.beats = analysis.beats.clone();
        self.grid_start_sample = analysis.grid_start_sample;
        self
    }

    /// Markers with fresh drag state.
    pub fn to_markers(&self) -> Vec<Marker> {
        self.markers.iter().copied().map(Marker::from).collect()
    }

    /// Copies the saved fields into `state`; audio is left untouched.
    pub fn restore_into(&self, state: &mut EditorState) {
        state.sample_rate = self.sample_rate;
        state.bpm = self.bpm;
        state.markers = self.to_markers();
        state.beats = self.beats.clone();
        state.grid_start_sample = self.grid_start_sample;
    }

    fn validate(&self) -> Result<(), StretchError> {
        if self.sample_rate == 0 {
            return Err(StretchError::InvalidSampleRate(self.sample_rate));
        }
        if !self.bpm.is_finite() || self.bpm < 0.0 {
            return Err(StretchError::InvalidFormat(format!("invalid bpm {}", self.bpm)));
        }
        Ok(())
    }
}

/// Writes a session as pretty-printed JSON.
pub fn write_session_json(path: &Path, session: &MarkerSession) -> Result<(), StretchError> {
    session.validate()?;
    let json = serde_json::to_string_pretty(session)
        .map_err(|e| StretchError::InvalidFormat(format!("failed to serialize marker session: {}", e)))?;
    std::fs::write(path, json)?;
    log::debug!(
        "session: wrote {} markers to {}",
        session.markers.len(),
        path.display()
    );
    Ok(())
}

/// Reads and validates a session written by [`write_session_json`].
pub fn read_session_json(path: &Path) -> Result<MarkerSession, StretchError> {
    let data = std::fs::read_to_string(path)?;
    let session: MarkerSession = serde_json::from_str(&data).map_err(|e| {
        StretchError::InvalidFormat(format!(
            "failed to parse marker session from {}: {}",
            path.display(),
            e
        ))
    })?;
    session.validate()?;
    Ok(session)
}
