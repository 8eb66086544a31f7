#![forbid(unsafe_code)]
//! Tempo analysis and marker-driven time stretching for DJ editing tools.
//!
//! `beatstretch` detects a track's BPM and beat grid, measures how far each
//! beat drifts from that grid, and straightens the timeline by stretching the
//! audio between user-placed markers. Stretching is pitch-preserving by
//! default (WSOLA) with a resampling mode for when pitch may follow tempo.
//!
//! # Quick Start
//!
//! ```
//! use beatstretch::{AnalysisOptions, Marker, MarkerData};
//!
//! // 8 seconds of clicks at 120 BPM
//! let sample_rate = 44100;
//! let mut samples = vec![0.0f32; sample_rate as usize * 8];
//! for beat in 0..16 {
//!     samples[1000 + beat * 22050] = 1.0;
//! }
//!
//! let analysis = beatstretch::analyze_bpm(&samples, sample_rate, &AnalysisOptions::default());
//! assert!((analysis.bpm - 120.0).abs() < 1.0);
//!
//! // Drag the marker at one second to 1.5 seconds.
//! let markers: Vec<Marker> = vec![
//!     MarkerData::new(0, sample_rate).into(),
//!     MarkerData::new(44100, sample_rate).with_position(66150, sample_rate).into(),
//! ];
//! let result = beatstretch::apply_time_stretch_to_markers(&[samples], &markers, sample_rate);
//! assert!(result.markers.last().unwrap().is_end_marker);
//! ```

pub mod analysis;
pub mod core;
pub mod error;
pub mod io;
pub mod markers;
pub mod stretch;

pub use analysis::bpm::{analyze_bpm, AnalysisOptions, AnalysisResult, BeatInfo, BpmAnalyzer};
pub use analysis::estimator::{EnergyPeakEstimator, OnsetFluxEstimator, TempoEstimator};
pub use analysis::key::{Key, KeyAnalysis, KeyEstimator};
pub use core::types::{AudioBuffer, Sample};
pub use error::{MarkerError, StretchError};
pub use markers::engine::{apply_time_stretch_to_markers, MarkerStretchEngine, MarkerStretchResult};
pub use markers::history::{EditHistory, EditorState};
pub use markers::model::{Marker, MarkerData};
pub use stretch::params::{StretchMode, WsolaConfig};
pub use stretch::processor::TimeStretchProcessor;

/// Detects the tempo of a mono signal with default options; 0.0 when none
/// is found.
pub fn detect_bpm(samples: &[f32], sample_rate: u32) -> f64 {
    analyze_bpm(samples, sample_rate, &AnalysisOptions::default()).bpm
}

/// Analyzes the mono mix of a buffer.
pub fn analyze_buffer(buffer: &AudioBuffer, options: &AnalysisOptions) -> AnalysisResult {
    analyze_bpm(&buffer.mono_mix(), buffer.sample_rate, options)
}

/// Stretches one mono segment with a default processor.
///
/// Degenerate factors return the input unchanged; see
/// [`TimeStretchProcessor::process_segment`].
pub fn process_segment(input: &[f32], factor: f32, preserve_pitch: bool) -> Vec<f32> {
    TimeStretchProcessor::default().process_segment(input, factor, preserve_pitch)
}

/// Stretches every channel of a buffer by `factor`.
///
/// # Errors
///
/// Returns [`StretchError::InvalidStretchFactor`] for a non-positive or
/// non-finite factor and [`StretchError::InvalidSampleRate`] for a zero
/// sample rate.
pub fn stretch_buffer(buffer: &AudioBuffer, factor: f32, preserve_pitch: bool) -> Result<AudioBuffer, StretchError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(StretchError::InvalidStretchFactor(factor));
    }
    if buffer.sample_rate == 0 {
        return Err(StretchError::InvalidSampleRate(buffer.sample_rate));
    }
    let mut processor = TimeStretchProcessor::default();
    let channels = processor.process_channels(&buffer.channels, factor, preserve_pitch);
    Ok(AudioBuffer::new(channels, buffer.sample_rate))
}

/// Stretches a buffer from `source_bpm` to `target_bpm`.
///
/// # Errors
///
/// Returns [`StretchError::InvalidOptions`] unless both tempos are positive
/// and finite.
pub fn stretch_to_bpm(
    buffer: &AudioBuffer,
    source_bpm: f64,
    target_bpm: f64,
    preserve_pitch: bool,
) -> Result<AudioBuffer, StretchError> {
    for (label, bpm) in [("source", source_bpm), ("target", target_bpm)] {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(StretchError::InvalidOptions(format!(
                "{} BPM must be positive, got {}",
                label, bpm
            )));
        }
    }
    stretch_buffer(buffer, bpm_ratio(source_bpm, target_bpm) as f32, preserve_pitch)
}

/// Stretch factor that turns `source_bpm` into `target_bpm`.
///
/// # Example
///
/// ```
/// let factor = beatstretch::bpm_ratio(126.0, 128.0);
/// assert!((factor - 0.984375).abs() < 1e-6);
/// ```
#[inline]
pub fn bpm_ratio(source_bpm: f64, target_bpm: f64) -> f64 {
    source_bpm / target_bpm
}
