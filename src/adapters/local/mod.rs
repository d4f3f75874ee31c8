//! Local adapters: OS processes, working directories and in-process event fan-out.

pub mod events;
pub mod fs;
pub mod process;

pub use events::{EventHub, FanoutSink};
pub use fs::WorkingDirs;
pub use process::TokioProcessLauncher;
