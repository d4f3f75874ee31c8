use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::events::Notification;
use crate::error::EngineResult;
use crate::ports::events::EventSink;

const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out of notifications to any number of local listeners.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Number of listeners reached; zero when nobody subscribed.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn broadcast(&self, notification: Notification) -> EngineResult<()> {
        self.publish(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(id: &str) -> Notification {
        Notification::StreamingStopped {
            video_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        hub.broadcast(stopped("v1")).await.unwrap();
        assert_eq!(first.recv().await.unwrap(), stopped("v1"));
        assert_eq!(second.recv().await.unwrap(), stopped("v1"));
    }

    #[tokio::test]
    async fn publishing_without_listeners_is_fine() {
        let hub = EventHub::new();
        assert_eq!(hub.publish(stopped("v1")), 0);
        assert!(hub.broadcast(stopped("v1")).await.is_ok());
    }
}
