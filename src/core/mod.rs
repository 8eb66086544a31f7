//! Core types, time conversions, window functions, and resampling utilities.

pub mod fft;
pub mod resample;
pub mod time;
pub mod types;
pub mod window;

pub use types::*;
pub use window::hann_window;
