//! Persistence helpers.

pub mod session;

pub use session::{read_session_json, write_session_json, MarkerSession};
