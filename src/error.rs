//! Error types for the beatstretch crate.
//!
//! Analysis and stretching never fail on expected input (silence, short
//! buffers, malformed marker spans); those cases come back as empty or
//! zero-confidence values. The errors here cover explicit validation and
//! persistence only.

use thiserror::Error;

/// Errors raised by option validation and session persistence.
#[derive(Debug, Error)]
pub enum StretchError {
    /// Analysis options are inconsistent.
    #[error("invalid analysis options: {0}")]
    InvalidOptions(String),
    /// Stretch factor must be positive and finite.
    #[error("invalid stretch factor: {0}, must be positive and finite")]
    InvalidStretchFactor(f32),
    /// Sample rate must be positive.
    #[error("invalid sample rate: {0}, must be greater than 0")]
    InvalidSampleRate(u32),
    /// Marker set failed validation.
    #[error(transparent)]
    Marker(#[from] MarkerError),
    /// Session artifact could not be serialized or parsed.
    #[error("invalid session format: {0}")]
    InvalidFormat(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a marker set cannot drive a stretch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkerError {
    /// Fewer than two markers were supplied.
    #[error("at least 2 markers are required, got {0}")]
    TooFewMarkers(usize),
    /// A marker lies outside the audio.
    #[error("marker {index} at sample {position} is outside the audio (0..={audio_len})")]
    OutOfBounds {
        index: usize,
        position: i64,
        audio_len: usize,
    },
    /// A segment would be compressed below the minimum factor.
    #[error("segment {index} has stretch factor {factor:.3}, minimum is {minimum}")]
    FactorTooSmall {
        index: usize,
        factor: f32,
        minimum: f32,
    },
}
