//! One live stream: encoder supervision, segment emission and stop handling.

use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::snapshots::SnapshotExtractor;
use super::LiveContext;
use crate::application::{best_effort, notify};
use crate::domain::encoding::args::live_args;
use crate::domain::events::{length_timestamp, Notification};
use crate::domain::hls::playlist::{last_segment_duration, segment_name};
use crate::domain::hls::{DemuxedSegment, ManifestSegmentDemuxer};
use crate::domain::jobs::{OutputFormat, Resolution};
use crate::domain::lifecycle::Lifecycle;
use crate::error::EngineResult;
use crate::ports::node::LiveSegmentUpload;
use crate::ports::process::{KillSwitch, ProcessEvent, ProcessHandle, StdinMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveStreamRequest {
    pub video_id: String,
    pub resolution: Resolution,
    /// Append every segment to `<id>/source/<id>.ts`
    pub record_locally: bool,
    /// Keep every segment on the node instead of a sliding window
    pub record_remotely: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct StreamStats {
    segments: u64,
    length_seconds: f64,
}

pub struct LiveStreamSession {
    request: LiveStreamRequest,
    lifecycle: Mutex<Lifecycle>,
    stats: Mutex<StreamStats>,
    kill: KillSwitch,
    finished: CancellationToken,
    snapshots: Arc<SnapshotExtractor>,
    ctx: LiveContext,
}

impl LiveStreamSession {
    /// Starts the ingest encoder. The handle must be passed to [`LiveStreamSession::drive`].
    pub(super) fn launch(
        ctx: LiveContext,
        request: LiveStreamRequest,
    ) -> EngineResult<(Arc<Self>, ProcessHandle)> {
        let list_size = if request.record_remotely {
            0
        } else {
            ctx.settings.window as usize
        };
        let args = live_args(
            &ctx.settings.rtmp_url(&request.video_id),
            request.resolution,
            ctx.toolchain.hardware,
            ctx.settings.segment_seconds,
            list_size,
        );
        let handle = ctx
            .launcher
            .launch(&ctx.toolchain.encoder, &args, StdinMode::Null)?;

        let session = Arc::new(Self {
            snapshots: Arc::new(SnapshotExtractor::new(&request.video_id, ctx.clone())),
            lifecycle: Mutex::new(Lifecycle::Pending),
            stats: Mutex::new(StreamStats::default()),
            kill: handle.kill_switch(),
            finished: CancellationToken::new(),
            request,
            ctx,
        });
        Ok((session, handle))
    }

    pub fn video_id(&self) -> &str {
        &self.request.video_id
    }

    pub fn request(&self) -> &LiveStreamRequest {
        &self.request
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().await
    }

    pub async fn segments_emitted(&self) -> u64 {
        self.stats.lock().await.segments
    }

    pub async fn length_seconds(&self) -> f64 {
        self.stats.lock().await.length_seconds
    }

    /// Resolves once the encoder exited and the session left its registry.
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    pub(super) fn mark_finished(&self) {
        self.finished.cancel();
    }

    pub(super) async fn mark_running(&self) {
        let mut state = self.lifecycle.lock().await;
        if let Ok(next) = state.advance(Lifecycle::Running) {
            *state = next;
        }
    }

    /// Operator stop: kill the encoder and report the stream as stopped. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.lifecycle.lock().await;
            match state.advance(Lifecycle::Stopping) {
                Ok(next) if !state.is_stopping() => *state = next,
                _ => return,
            }
        }
        info!(video_id = %self.video_id(), "stopping live stream");
        self.kill.kill();
        self.announce_stopped().await;
    }

    /// Feeds encoder output through the demuxer until the process exits.
    pub(super) async fn drive(&self, mut handle: ProcessHandle) -> Option<i32> {
        let mut demuxer = ManifestSegmentDemuxer::with_limit(
            self.request.resolution,
            self.ctx.settings.max_demux_buffer,
        );
        let mut recording = self.open_recording().await;
        let mut stalled = false;
        let mut exit = None;

        while let Some(event) = handle.next_event().await {
            match event {
                ProcessEvent::Stdout(_) if stalled => {}
                ProcessEvent::Stdout(chunk) => match demuxer.push(&chunk) {
                    Ok(Some(segment)) => self.emit(segment, recording.as_mut()).await,
                    Ok(None) => {}
                    Err(e) => {
                        // the encoder exit then goes through the unexpected-exit path
                        error!(video_id = %self.video_id(), error = %e, "live demuxer stalled, killing encoder");
                        stalled = true;
                        self.kill.kill();
                    }
                },
                ProcessEvent::Stderr(chunk) => {
                    trace!(video_id = %self.video_id(), bytes = chunk.len(), "encoder diagnostics");
                }
                ProcessEvent::Exited(code) => {
                    exit = code;
                    break;
                }
            }
        }

        if let Some(file) = recording.as_mut() {
            if let Err(e) = file.flush().await {
                warn!(video_id = %self.video_id(), error = %e, "recording flush failed");
            }
        }
        self.on_exit(exit).await;
        exit
    }

    async fn open_recording(&self) -> Option<File> {
        if !self.request.record_locally {
            return None;
        }
        let dirs = &self.ctx.dirs;
        let path = dirs.recording_file(self.video_id());
        if let Err(e) = dirs.ensure(&dirs.source_dir(self.video_id())).await {
            warn!(video_id = %self.video_id(), error = %e, "recording disabled");
            return None;
        }
        match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "recording disabled");
                None
            }
        }
    }

    async fn emit(&self, segment: DemuxedSegment, recording: Option<&mut File>) {
        let video_id = self.video_id();
        let resolution = self.request.resolution;
        let index = segment.sequence_index;

        let upload = LiveSegmentUpload {
            video_id: video_id.to_string(),
            format: OutputFormat::Hls,
            resolution,
            manifest_name: segment.manifest_name.clone(),
            segment_name: segment.segment_name.clone(),
            manifest: segment.manifest.clone(),
            segment: segment.segment.clone(),
        };
        match self.ctx.node.upload_live_segment(&upload).await {
            Ok(()) => debug!(video_id, segment_index = index, "live segment uploaded"),
            Err(e) => warn!(video_id, segment_index = index, error = %e, "live segment upload failed"),
        }

        if let Some(file) = recording {
            if let Err(e) = file.write_all(&segment.segment).await {
                warn!(video_id, segment_index = index, error = %e, "recording write failed");
            }
        }

        let window = self.ctx.settings.window;
        if !self.request.record_remotely && index >= window {
            let stale = segment_name(resolution, index - window);
            best_effort(
                "remove_live_segment",
                video_id,
                self.ctx
                    .node
                    .remove_live_segment(video_id, OutputFormat::Hls, resolution, &stale)
                    .await,
            );
        }

        let duration = std::str::from_utf8(&segment.manifest)
            .ok()
            .and_then(last_segment_duration)
            .filter(|seconds| *seconds > 0.0)
            .unwrap_or(self.ctx.settings.segment_seconds as f64);
        let stats = {
            let mut stats = self.stats.lock().await;
            stats.segments += 1;
            stats.length_seconds += duration;
            *stats
        };
        let bandwidth_bps = (segment.segment.len() as f64 * 8.0 / duration).round() as u64;

        notify(
            self.ctx.events.as_ref(),
            Notification::Streaming {
                video_id: video_id.to_string(),
                resolution,
                segment_index: index,
                bandwidth_bps,
                length_seconds: stats.length_seconds,
            },
        )
        .await;
        self.snapshots.offer(segment.segment).await;
    }

    async fn on_exit(&self, code: Option<i32>) {
        let unexpected = {
            let mut state = self.lifecycle.lock().await;
            let unexpected = !state.is_stopping();
            if let Ok(next) = state.advance(Lifecycle::Stopped) {
                *state = next;
            }
            unexpected
        };
        if unexpected {
            warn!(video_id = %self.video_id(), ?code, "live encoder exited without a stop request");
            self.announce_stopped().await;
        } else {
            info!(video_id = %self.video_id(), ?code, "live encoder stopped");
        }
    }

    async fn announce_stopped(&self) {
        let video_id = self.video_id();
        best_effort(
            "stop_streaming",
            video_id,
            self.ctx.node.stop_streaming(video_id).await,
        );
        notify(
            self.ctx.events.as_ref(),
            Notification::StreamingStopped {
                video_id: video_id.to_string(),
            },
        )
        .await;

        if self.request.record_locally {
            let seconds = self.length_seconds().await.floor() as u64;
            best_effort(
                "set_source_extension",
                video_id,
                self.ctx.node.set_source_extension(video_id, "ts").await,
            );
            best_effort(
                "set_lengths",
                video_id,
                self.ctx
                    .node
                    .set_lengths(video_id, seconds, &length_timestamp(seconds))
                    .await,
            );
        }
    }
}
