//! Adapters - Concrete implementations of ports.

pub mod local;
pub mod node;

pub use node::HttpNodeClient;
