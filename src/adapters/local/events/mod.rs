use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::events::Notification;
use crate::error::EngineResult;
use crate::ports::events::EventSink;

pub mod hub;

pub use hub::EventHub;

/// Delivers every notification to each sink in order; reports the last failure.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn broadcast(&self, notification: Notification) -> EngineResult<()> {
        let mut outcome = Ok(());
        for sink in &self.sinks {
            if let Err(e) = sink.broadcast(notification.clone()).await {
                outcome = Err(e);
            }
        }
        outcome
    }
}
