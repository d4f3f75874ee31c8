//! Per-video lifecycle used for cooperative cancellation.
//!
//! Publishing cycles and live sessions both move through
//! `Pending -> Running -> Stopping -> Stopped`; a stop request is only ever
//! observed by reading the state, never by a side channel.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Pending,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: Lifecycle,
    pub to: Lifecycle,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Pending => "pending",
            Lifecycle::Running => "running",
            Lifecycle::Stopping => "stopping",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

impl Lifecycle {
    pub fn advance(self, to: Lifecycle) -> Result<Lifecycle, InvalidTransition> {
        use Lifecycle::*;
        let allowed = matches!(
            (self, to),
            (Pending, Pending)
                | (Pending, Running)
                | (Running, Running)
                | (Pending, Stopping)
                | (Running, Stopping)
                | (Stopping, Stopping)
                | (Pending, Stopped)
                | (Running, Stopped)
                | (Stopping, Stopped)
                | (Stopped, Pending)
        );
        if allowed {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self, Lifecycle::Stopping)
    }
}

/// Lifecycle of every video with publishing work in flight.
#[derive(Debug, Default)]
pub struct LifecycleRegistry {
    states: HashMap<String, Lifecycle>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, video_id: &str) -> Option<Lifecycle> {
        self.states.get(video_id).copied()
    }

    pub fn is_stopping(&self, video_id: &str) -> bool {
        self.state(video_id).map_or(false, |state| state.is_stopping())
    }

    pub fn transition(
        &mut self,
        video_id: &str,
        to: Lifecycle,
    ) -> Result<Lifecycle, InvalidTransition> {
        let from = self.state(video_id).unwrap_or(Lifecycle::Stopped);
        let next = from.advance(to)?;
        self.states.insert(video_id.to_string(), next);
        Ok(next)
    }

    /// Drops the entry once its cycle is over.
    pub fn forget(&mut self, video_id: &str) -> Option<Lifecycle> {
        self.states.remove(video_id)
    }
}
