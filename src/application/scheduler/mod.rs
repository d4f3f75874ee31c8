//! VOD publish scheduler: bounded concurrency with failure-driven throttling.
//!
//! A periodic tick moves pending jobs into free slots. Each job runs
//! encode then upload as one linear task; its outcome is folded back into
//! [`SchedulerState`] under a single lock. Waiting jobs keep broadcasting a
//! "queued" progress so retries stay visible to the node.

pub mod state;

pub use state::{Departure, SchedulerState};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::probe::{MediaProbe, Toolchain};
use super::uploader::ArtifactUploader;
use super::{best_effort, notify};
use crate::adapters::local::WorkingDirs;
use crate::config::SchedulerSettings;
use crate::domain::encoding::args::vod_args;
use crate::domain::encoding::ProgressTracker;
use crate::domain::events::{length_timestamp, Notification, PublishPhase};
use crate::domain::jobs::PublishJob;
use crate::error::{EngineError, EngineResult};
use crate::ports::events::EventSink;
use crate::ports::node::NodePort;
use crate::ports::process::{ProcessEvent, ProcessLauncher, StdinMode};

struct Inner {
    state: Mutex<SchedulerState>,
    idle: Mutex<HashMap<PublishJob, CancellationToken>>,
    launcher: Arc<dyn ProcessLauncher>,
    node: Arc<dyn NodePort>,
    events: Arc<dyn EventSink>,
    uploader: ArtifactUploader,
    probe: MediaProbe,
    dirs: WorkingDirs,
    toolchain: Toolchain,
    settings: SchedulerSettings,
}

#[derive(Clone)]
pub struct PublishScheduler {
    inner: Arc<Inner>,
}

impl PublishScheduler {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        node: Arc<dyn NodePort>,
        events: Arc<dyn EventSink>,
        dirs: WorkingDirs,
        toolchain: Toolchain,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::new(settings.concurrency)),
                idle: Mutex::new(HashMap::new()),
                uploader: ArtifactUploader::new(node.clone(), events.clone()),
                probe: MediaProbe::new(launcher.clone()),
                launcher,
                node,
                events,
                dirs,
                toolchain,
                settings,
            }),
        }
    }

    pub async fn limit(&self) -> usize {
        self.inner.state.lock().await.limit()
    }

    pub async fn pending_jobs(&self) -> Vec<PublishJob> {
        self.inner.state.lock().await.pending().cloned().collect()
    }

    pub async fn active_len(&self) -> usize {
        self.inner.state.lock().await.active_len()
    }

    /// Queues a job and starts its "queued" progress broadcast.
    pub async fn enqueue(&self, job: PublishJob) -> EngineResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.enqueue(job.clone())? {
            info!(job = %job.describe(), "publish job queued");
            // armed under the state lock so no tick can start the job first
            self.arm_idle(job).await;
        } else {
            debug!(job = %job.describe(), "publish job already scheduled");
        }
        Ok(())
    }

    /// Stops every publishing job of a video; in-flight jobs end at their next stage boundary.
    pub async fn stop_video(&self, video_id: &str) -> usize {
        let removed = self.inner.state.lock().await.stop_video(video_id);
        for job in &removed {
            self.disarm_idle(job).await;
        }
        info!(video_id, removed = removed.len(), "publishing stopped");
        removed.len()
    }

    /// Starts as many pending jobs as the current limit allows.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        let ready = self.inner.state.lock().await.take_ready();
        ready
            .into_iter()
            .map(|job| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.execute(job).await })
            })
            .collect()
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.inner.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let started = self.tick().await.len();
                    if started > 0 {
                        debug!(started, "scheduler tick");
                    }
                }
            }
        }
        let idle = std::mem::take(&mut *self.inner.idle.lock().await);
        for token in idle.into_values() {
            token.cancel();
        }
        info!("publish scheduler stopped");
    }

    async fn arm_idle(&self, job: PublishJob) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .inner
            .idle
            .lock()
            .await
            .insert(job.clone(), token.clone())
        {
            previous.cancel();
        }

        let events = self.inner.events.clone();
        let period = self.inner.settings.idle_progress;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        notify(events.as_ref(), progress(&job, PublishPhase::Queued, 0)).await;
                    }
                }
            }
        });
    }

    async fn disarm_idle(&self, job: &PublishJob) {
        if let Some(token) = self.inner.idle.lock().await.remove(job) {
            token.cancel();
        }
    }

    async fn guard(&self, job: &PublishJob) -> EngineResult<()> {
        if self.inner.state.lock().await.is_stopping(&job.video_id) {
            return Err(EngineError::PublishingStopping);
        }
        Ok(())
    }

    async fn execute(&self, job: PublishJob) {
        self.disarm_idle(&job).await;
        let result = self.publish(&job).await;
        self.settle(job, result).await;
    }

    async fn publish(&self, job: &PublishJob) -> EngineResult<()> {
        self.guard(job).await?;
        best_effort(
            "mark_publishing",
            &job.video_id,
            self.inner.node.mark_publishing(&job.video_id).await,
        );
        self.encode(job).await?;

        self.guard(job).await?;
        let output_dir = self
            .inner
            .dirs
            .output_dir(&job.video_id, job.format, job.resolution);
        let files = self.inner.dirs.list_files(&output_dir).await?;
        self.inner.uploader.upload(job, files).await
    }

    async fn encode(&self, job: &PublishJob) -> EngineResult<()> {
        let dirs = &self.inner.dirs;
        let source = dirs.source_file(&job.video_id, &job.source_extension);
        let output_dir = dirs.output_dir(&job.video_id, job.format, job.resolution);
        dirs.reset(&output_dir).await?;

        let args = vod_args(
            &source,
            &output_dir,
            job.format,
            job.resolution,
            self.inner.toolchain.hardware,
            self.inner.settings.segment_seconds,
        );
        let mut handle = self
            .inner
            .launcher
            .launch(&self.inner.toolchain.encoder, &args, StdinMode::Null)?;
        info!(job = %job.describe(), hardware = %self.inner.toolchain.hardware, "encoding started");
        notify(
            self.inner.events.as_ref(),
            progress(job, PublishPhase::Encoding, 0),
        )
        .await;

        let mut tracker = ProgressTracker::new();
        while let Some(event) = handle.next_event().await {
            match event {
                ProcessEvent::Stderr(chunk) => {
                    if let Some(value) = tracker.feed(&chunk) {
                        notify(
                            self.inner.events.as_ref(),
                            progress(job, PublishPhase::Encoding, value),
                        )
                        .await;
                    }
                }
                ProcessEvent::Stdout(_) => {}
                ProcessEvent::Exited(Some(0)) => return Ok(()),
                ProcessEvent::Exited(code) => return Err(EngineError::EncodingFailed { code }),
            }
        }
        Err(EngineError::EncodingFailed { code: None })
    }

    async fn settle(&self, job: PublishJob, result: EngineResult<()>) {
        let mut state = self.inner.state.lock().await;
        let mut failure = None;
        let departure = match result {
            Ok(()) => {
                info!(job = %job.describe(), "publish job done");
                Some(state.complete(&job))
            }
            Err(EngineError::PublishingStopping) => {
                info!(job = %job.describe(), "publish job discarded, video is stopping");
                Some(state.discard(&job))
            }
            Err(e) if e.is_operator_fault() => {
                error!(job = %job.describe(), error = %e, "publish job dropped");
                failure = Some(e.to_string());
                Some(state.discard(&job))
            }
            Err(e) if state.is_stopping(&job.video_id) => {
                info!(job = %job.describe(), error = %e, "publish job failed while stopping");
                Some(state.discard(&job))
            }
            Err(e) => {
                state.fail(job.clone());
                warn!(job = %job.describe(), error = %e, limit = state.limit(), "publish job requeued");
                self.arm_idle(job.clone()).await;
                None
            }
        };
        drop(state);

        let Some(departure) = departure else {
            return;
        };
        if departure.limit_reset {
            debug!("scheduler idle, concurrency limit restored");
        }
        if let Some(reason) = failure {
            notify(
                self.inner.events.as_ref(),
                Notification::PublishFailed {
                    video_id: job.video_id.clone(),
                    format: job.format,
                    resolution: job.resolution,
                    reason,
                },
            )
            .await;
        }
        if departure.finalize {
            self.finalize(&job).await;
        }
    }

    /// Re-probes the retained source and reports the video as published.
    async fn finalize(&self, job: &PublishJob) {
        let source = self
            .inner
            .dirs
            .source_file(&job.video_id, &job.source_extension);
        let seconds = match self
            .inner
            .probe
            .duration_seconds(&self.inner.toolchain.prober, &source)
            .await
        {
            Ok(duration) => duration.floor() as u64,
            Err(e) => {
                warn!(video_id = %job.video_id, error = %e, "duration probe failed");
                0
            }
        };
        let timestamp = length_timestamp(seconds);
        best_effort(
            "mark_published",
            &job.video_id,
            self.inner
                .node
                .mark_published(&job.video_id, seconds, &timestamp)
                .await,
        );
        info!(video_id = %job.video_id, length_seconds = seconds, "video published");
        notify(
            self.inner.events.as_ref(),
            Notification::Published {
                video_id: job.video_id.clone(),
                length_seconds: seconds,
                length_timestamp: timestamp,
            },
        )
        .await;
    }
}

fn progress(job: &PublishJob, phase: PublishPhase, value: u8) -> Notification {
    Notification::Publishing {
        video_id: job.video_id.clone(),
        format: job.format,
        resolution: job.resolution,
        phase,
        progress: value,
    }
}
