pub mod beat_class;
pub mod bpm;
pub mod envelope;
pub mod estimator;
pub mod key;
pub mod waveform;

pub use beat_class::*;
pub use bpm::*;
pub use estimator::*;
pub use key::*;
pub use waveform::*;
