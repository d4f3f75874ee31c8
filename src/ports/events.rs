use async_trait::async_trait;

use crate::domain::events::Notification;
use crate::error::EngineResult;

/// Notification channel towards the node and local listeners.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn broadcast(&self, notification: Notification) -> EngineResult<()>;
}
