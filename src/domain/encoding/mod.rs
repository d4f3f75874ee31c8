//! Encoder configuration: bitrate ladder, hardware profiles, CLI grammar and
//! diagnostic-stream progress parsing.

pub mod args;
pub mod hardware;
pub mod ladder;
pub mod progress;

pub use hardware::{HardwareProfile, HardwareSelection};
pub use ladder::{rung, Rung};
pub use progress::ProgressTracker;
