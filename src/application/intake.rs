//! Routes agent commands to the publish scheduler and the live registry.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::live::{LiveSessionRegistry, LiveStreamRequest};
use super::scheduler::PublishScheduler;
use crate::domain::commands::EngineCommand;
use crate::error::EngineResult;

#[derive(Clone)]
pub struct CommandIntake {
    scheduler: PublishScheduler,
    live: LiveSessionRegistry,
}

impl CommandIntake {
    pub fn new(scheduler: PublishScheduler, live: LiveSessionRegistry) -> Self {
        Self { scheduler, live }
    }

    pub async fn dispatch(&self, command: EngineCommand) -> EngineResult<()> {
        match command {
            command @ EngineCommand::Publish { .. } => {
                for job in command.publish_jobs() {
                    self.scheduler.enqueue(job).await?;
                }
            }
            EngineCommand::StopPublishing { video_id } => {
                self.scheduler.stop_video(&video_id).await;
            }
            EngineCommand::StartLive {
                video_id,
                resolution,
                record_locally,
                record_remotely,
            } => {
                self.live
                    .start(LiveStreamRequest {
                        video_id,
                        resolution,
                        record_locally,
                        record_remotely,
                    })
                    .await?;
            }
            EngineCommand::StopLive { video_id } => self.live.stop(&video_id).await?,
        }
        Ok(())
    }

    /// Reads one JSON command per line until EOF or shutdown. Bad lines are logged and skipped.
    pub async fn run<R>(&self, reader: R, shutdown: CancellationToken)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "command input failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EngineCommand>(&line) {
                Ok(command) => {
                    info!(?command, "command received");
                    if let Err(e) = self.dispatch(command).await {
                        warn!(error = %e, "command rejected");
                    }
                }
                Err(e) => warn!(error = %e, "unparsable command"),
            }
        }
        info!("command intake closed");
    }
}
