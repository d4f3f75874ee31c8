//! Application layer - scheduling, uploading and live sessions built on the ports.

pub mod intake;
pub mod live;
pub mod probe;
pub mod scheduler;
pub mod uploader;

pub use intake::CommandIntake;
pub use live::{LiveSessionRegistry, LiveStreamRequest, LiveStreamSession};
pub use probe::{MediaProbe, Toolchain};
pub use scheduler::PublishScheduler;
pub use uploader::ArtifactUploader;

use tracing::warn;

use crate::domain::events::Notification;
use crate::error::EngineResult;
use crate::ports::events::EventSink;

/// Broadcasts a status event; failures are logged and swallowed.
pub(crate) async fn notify(events: &dyn EventSink, notification: Notification) {
    let video_id = notification.video_id().to_string();
    if let Err(e) = events.broadcast(notification).await {
        warn!(video_id = %video_id, error = %e, "notification dropped");
    }
}

/// Logs a failed best-effort node call.
pub(crate) fn best_effort(call: &str, video_id: &str, result: EngineResult<()>) {
    if let Err(e) = result {
        warn!(video_id, call, error = %e, "remote notification failed");
    }
}
