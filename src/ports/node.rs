use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::domain::events::ImageKind;
use crate::domain::jobs::{OutputFormat, Resolution};
use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub name: String,
    pub path: PathBuf,
}

/// Output of one publish job, shipped in a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    pub video_id: String,
    pub format: OutputFormat,
    pub resolution: Resolution,
    pub auth_token: String,
    pub files: Vec<ArtifactFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSegmentUpload {
    pub video_id: String,
    pub format: OutputFormat,
    pub resolution: Resolution,
    pub manifest_name: String,
    pub segment_name: String,
    pub manifest: Bytes,
    pub segment: Bytes,
}

/// The remote video-hosting node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodePort: Send + Sync {
    async fn mark_publishing(&self, video_id: &str) -> EngineResult<()>;

    async fn mark_published(
        &self,
        video_id: &str,
        length_seconds: u64,
        length_timestamp: &str,
    ) -> EngineResult<()>;

    async fn upload_artifacts(&self, bundle: &ArtifactBundle) -> EngineResult<()>;

    async fn upload_live_segment(&self, upload: &LiveSegmentUpload) -> EngineResult<()>;

    async fn remove_live_segment(
        &self,
        video_id: &str,
        format: OutputFormat,
        resolution: Resolution,
        segment_name: &str,
    ) -> EngineResult<()>;

    async fn set_source_extension(&self, video_id: &str, extension: &str) -> EngineResult<()>;

    async fn set_lengths(
        &self,
        video_id: &str,
        length_seconds: u64,
        length_timestamp: &str,
    ) -> EngineResult<()>;

    async fn stop_streaming(&self, video_id: &str) -> EngineResult<()>;

    async fn upload_image(&self, video_id: &str, kind: ImageKind, path: &Path)
        -> EngineResult<()>;
}
