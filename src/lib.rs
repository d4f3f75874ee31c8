//! Relaycast - transcoding and live-segment engine
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, events, lifecycle, encoding, hls)
//! - ports/: Trait definitions (processes, remote node, notifications)
//! - adapters/: Concrete implementations (tokio processes, filesystem, HTTP node)
//! - application/: Publish scheduler, uploader and live sessions
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

#[cfg(test)]
mod testing;

pub use config::AgentConfig;
pub use domain::hls;
pub use error::{EngineError, EngineResult};
