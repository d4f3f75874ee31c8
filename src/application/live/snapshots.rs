//! Still extraction from live segments: one grab, three resized derivatives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::LiveContext;
use crate::application::notify;
use crate::domain::encoding::args::{resize_args, snapshot_args};
use crate::domain::events::{ImageKind, Notification};
use crate::error::{EngineError, EngineResult};
use crate::ports::process::StdinMode;

const STILL_NAME: &str = "snapshot.jpg";

fn slot(kind: ImageKind) -> usize {
    match kind {
        ImageKind::Thumbnail => 0,
        ImageKind::Preview => 1,
        ImageKind::Poster => 2,
    }
}

/// Busy flag per derivative plus the time of the last attempt.
#[derive(Debug, Default)]
pub struct SnapshotGate {
    busy: [bool; 3],
    last_attempt: Option<Instant>,
}

impl SnapshotGate {
    /// Claims all three flags when none is busy and `spacing` has elapsed.
    pub fn try_begin(&mut self, now: Instant, spacing: Duration) -> bool {
        if self.busy.iter().any(|busy| *busy) {
            return false;
        }
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < spacing {
                return false;
            }
        }
        self.busy = [true; 3];
        self.last_attempt = Some(now);
        true
    }

    pub fn release(&mut self, kind: ImageKind) {
        self.busy[slot(kind)] = false;
    }

    pub fn release_all(&mut self) {
        self.busy = [false; 3];
    }

    pub fn is_busy(&self, kind: ImageKind) -> bool {
        self.busy[slot(kind)]
    }
}

pub struct SnapshotExtractor {
    video_id: String,
    gate: Mutex<SnapshotGate>,
    ctx: LiveContext,
}

impl SnapshotExtractor {
    pub fn new(video_id: impl Into<String>, ctx: LiveContext) -> Self {
        Self {
            video_id: video_id.into(),
            gate: Mutex::new(SnapshotGate::default()),
            ctx,
        }
    }

    pub async fn is_busy(&self, kind: ImageKind) -> bool {
        self.gate.lock().await.is_busy(kind)
    }

    /// Starts an extraction from `segment` unless one is running or happened too recently.
    pub async fn offer(self: &Arc<Self>, segment: Bytes) -> Option<JoinHandle<()>> {
        let spacing = self.ctx.snapshots.spacing;
        if !self.gate.lock().await.try_begin(Instant::now(), spacing) {
            return None;
        }
        let extractor = Arc::clone(self);
        Some(tokio::spawn(async move { extractor.extract(segment).await }))
    }

    async fn extract(&self, segment: Bytes) {
        let still = match self.grab_still(segment).await {
            Ok(still) => still,
            Err(e) => {
                warn!(video_id = %self.video_id, error = %e, "snapshot extraction failed");
                self.gate.lock().await.release_all();
                return;
            }
        };

        join_all(ImageKind::ALL.into_iter().map(|kind| self.derive(kind, &still))).await;
        if let Err(e) = tokio::fs::remove_file(&still).await {
            debug!(path = %still.display(), error = %e, "still not removed");
        }
    }

    async fn grab_still(&self, segment: Bytes) -> EngineResult<PathBuf> {
        let dir = self.ctx.dirs.images_dir(&self.video_id);
        self.ctx.dirs.ensure(&dir).await?;
        let still = dir.join(STILL_NAME);

        let mut handle = self.ctx.launcher.launch(
            &self.ctx.toolchain.encoder,
            &snapshot_args(&still),
            StdinMode::Piped,
        )?;
        if let Some(mut stdin) = handle.take_stdin() {
            tokio::spawn(async move {
                // The encoder may close stdin after the first frame.
                if let Err(e) = stdin.write_all(&segment).await {
                    debug!(error = %e, "snapshot stdin closed early");
                }
                let _ = stdin.shutdown().await;
            });
        }
        let output = handle.wait_output().await;
        if !output.success() {
            return Err(EngineError::EncodingFailed { code: output.code });
        }
        Ok(still)
    }

    /// Resizes, uploads and removes one derivative; always clears its flag.
    async fn derive(&self, kind: ImageKind, still: &Path) {
        match self.derive_and_upload(kind, still).await {
            Ok(()) => {
                info!(video_id = %self.video_id, kind = kind.as_str(), "live image updated");
                notify(
                    self.ctx.events.as_ref(),
                    Notification::ImageUpdated {
                        video_id: self.video_id.clone(),
                        kind,
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(video_id = %self.video_id, kind = kind.as_str(), error = %e, "live image failed")
            }
        }
        self.gate.lock().await.release(kind);
    }

    async fn derive_and_upload(&self, kind: ImageKind, still: &Path) -> EngineResult<()> {
        let (width, height) = kind.dimensions();
        let target = still.with_file_name(format!("{}.jpg", kind.as_str()));
        let output = self
            .ctx
            .launcher
            .launch(
                &self.ctx.toolchain.encoder,
                &resize_args(still, &target, width, height),
                StdinMode::Null,
            )?
            .wait_output()
            .await;
        if !output.success() {
            return Err(EngineError::EncodingFailed { code: output.code });
        }
        let result = self
            .ctx
            .node
            .upload_image(&self.video_id, kind, &target)
            .await;
        let _ = tokio::fs::remove_file(&target).await;
        result
    }
}
