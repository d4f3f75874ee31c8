//! Domain layer - Pure business logic.

pub mod commands;
pub mod encoding;
pub mod events;
pub mod hls;
pub mod jobs;
pub mod lifecycle;
