use std::sync::Arc;

use tracing::{debug, info, warn};

use super::notify;
use crate::domain::events::{Notification, PublishPhase};
use crate::domain::encoding::progress::ENCODE_SHARE;
use crate::domain::jobs::PublishJob;
use crate::error::{EngineError, EngineResult};
use crate::ports::events::EventSink;
use crate::ports::node::{ArtifactBundle, ArtifactFile, NodePort};

/// Ships one job's output files to the node, then deletes them locally.
#[derive(Clone)]
pub struct ArtifactUploader {
    node: Arc<dyn NodePort>,
    events: Arc<dyn EventSink>,
}

impl ArtifactUploader {
    pub fn new(node: Arc<dyn NodePort>, events: Arc<dyn EventSink>) -> Self {
        Self { node, events }
    }

    async fn progress(&self, job: &PublishJob, progress: u8) {
        notify(
            self.events.as_ref(),
            Notification::Publishing {
                video_id: job.video_id.clone(),
                format: job.format,
                resolution: job.resolution,
                phase: PublishPhase::Uploading,
                progress,
            },
        )
        .await;
    }

    pub async fn upload(&self, job: &PublishJob, files: Vec<ArtifactFile>) -> EngineResult<()> {
        if files.is_empty() {
            return Err(EngineError::UploadFailed(format!(
                "no artifacts produced for {}",
                job.describe()
            )));
        }
        self.progress(job, ENCODE_SHARE).await;

        let bundle = ArtifactBundle {
            video_id: job.video_id.clone(),
            format: job.format,
            resolution: job.resolution,
            auth_token: job.auth_token.clone(),
            files,
        };
        let result = self.node.upload_artifacts(&bundle).await;
        remove_files(&bundle.files).await;
        result?;

        info!(job = %job.describe(), files = bundle.files.len(), "artifacts uploaded");
        self.progress(job, 100).await;
        Ok(())
    }
}

async fn remove_files(files: &[ArtifactFile]) {
    for file in files {
        match tokio::fs::remove_file(&file.path).await {
            Ok(()) => debug!(path = %file.path.display(), "artifact removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %file.path.display(), error = %e, "failed to remove artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::EventHub;
    use crate::domain::jobs::{OutputFormat, Resolution};
    use crate::ports::node::MockNodePort;
    use tempfile::tempdir;

    fn job() -> PublishJob {
        PublishJob::new("v1", OutputFormat::Hls, Resolution::P360, "mkv", "secret")
    }

    async fn artifacts(dir: &std::path::Path) -> Vec<ArtifactFile> {
        let mut files = Vec::new();
        for name in ["manifest-360p.m3u8", "segment-360p-0.ts"] {
            let path = dir.join(name);
            tokio::fs::write(&path, name).await.unwrap();
            files.push(ArtifactFile {
                name: name.to_string(),
                path,
            });
        }
        files
    }

    fn uploading_progress(events: Vec<Notification>) -> Vec<u8> {
        events
            .into_iter()
            .filter_map(|event| match event {
                Notification::Publishing {
                    phase: PublishPhase::Uploading,
                    progress,
                    ..
                } => Some(progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn success_reports_both_halves_and_cleans_up() {
        let temp = tempdir().unwrap();
        let files = artifacts(temp.path()).await;
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        let mut node = MockNodePort::new();
        node.expect_upload_artifacts()
            .withf(|bundle| {
                bundle.auth_token == "secret"
                    && bundle.files.len() == 2
                    && bundle.resolution == Resolution::P360
            })
            .times(1)
            .returning(|_| Ok(()));
        let hub = EventHub::new();
        let mut listener = hub.subscribe();

        let uploader = ArtifactUploader::new(Arc::new(node), Arc::new(hub));
        uploader.upload(&job(), files).await.unwrap();

        assert!(paths.iter().all(|path| !path.exists()));
        let mut seen = Vec::new();
        while let Ok(event) = listener.try_recv() {
            seen.push(event);
        }
        assert_eq!(uploading_progress(seen), vec![50, 100]);
    }

    #[tokio::test]
    async fn failure_still_deletes_local_files() {
        let temp = tempdir().unwrap();
        let files = artifacts(temp.path()).await;
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        let mut node = MockNodePort::new();
        node.expect_upload_artifacts()
            .returning(|_| Err(EngineError::UploadFailed("503".into())));
        let uploader = ArtifactUploader::new(Arc::new(node), Arc::new(EventHub::new()));

        let err = uploader.upload(&job(), files).await.unwrap_err();
        assert!(matches!(err, EngineError::UploadFailed(_)));
        assert!(paths.iter().all(|path| !path.exists()));
    }

    #[tokio::test]
    async fn nothing_to_upload_is_a_failure() {
        let mut node = MockNodePort::new();
        node.expect_upload_artifacts().never();
        let uploader = ArtifactUploader::new(Arc::new(node), Arc::new(EventHub::new()));
        assert!(uploader.upload(&job(), Vec::new()).await.is_err());
    }
}
