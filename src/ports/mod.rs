//! Ports - the seams between scheduling logic and the outside world.

pub mod events;
pub mod node;
pub mod process;
