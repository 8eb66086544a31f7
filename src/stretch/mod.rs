pub mod params;
pub mod processor;
pub mod wsola;

pub use params::{StretchMode, WsolaConfig};
pub use processor::TimeStretchProcessor;
pub use wsola::Wsola;
