//! HTTP client for the remote video-hosting node.
//!
//! Status calls post JSON; artifact, live segment and image uploads post
//! multipart forms. Every route lives under `<node>/streamer/`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::json;

use crate::domain::events::{ImageKind, Notification};
use crate::domain::jobs::{OutputFormat, Resolution};
use crate::error::{EngineError, EngineResult};
use crate::ports::events::EventSink;
use crate::ports::node::{ArtifactBundle, LiveSegmentUpload, NodePort};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpNodeClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::RemoteNotificationFailed(e.to_string()))?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/streamer/{}", self.base_url, route)
    }

    fn post(&self, route: &str) -> RequestBuilder {
        let request = self.client.post(self.url(route));
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    async fn post_status(&self, route: &str, body: serde_json::Value) -> EngineResult<()> {
        self.post(route)
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| EngineError::RemoteNotificationFailed(format!("{}: {}", route, e)))?;
        Ok(())
    }

    async fn post_upload(&self, route: &str, form: Form) -> EngineResult<()> {
        self.post(route)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

async fn file_part(name: &str, path: &Path) -> EngineResult<Part> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    Ok(Part::bytes(data).file_name(name.to_string()))
}

fn target_fields(
    form: Form,
    video_id: &str,
    format: OutputFormat,
    resolution: Resolution,
) -> Form {
    form.text("videoId", video_id.to_string())
        .text("format", format.as_str())
        .text("resolution", resolution.as_str())
}

#[async_trait]
impl NodePort for HttpNodeClient {
    async fn mark_publishing(&self, video_id: &str) -> EngineResult<()> {
        self.post_status("video/publishing", json!({ "videoId": video_id }))
            .await
    }

    async fn mark_published(
        &self,
        video_id: &str,
        length_seconds: u64,
        length_timestamp: &str,
    ) -> EngineResult<()> {
        self.post_status(
            "video/published",
            json!({
                "videoId": video_id,
                "lengthSeconds": length_seconds,
                "lengthTimestamp": length_timestamp,
            }),
        )
        .await
    }

    async fn upload_artifacts(&self, bundle: &ArtifactBundle) -> EngineResult<()> {
        let mut form = target_fields(Form::new(), &bundle.video_id, bundle.format, bundle.resolution)
            .text("authToken", bundle.auth_token.clone());
        for file in &bundle.files {
            form = form.part("files", file_part(&file.name, &file.path).await?);
        }
        self.post_upload("video/upload", form).await
    }

    async fn upload_live_segment(&self, upload: &LiveSegmentUpload) -> EngineResult<()> {
        let form = target_fields(Form::new(), &upload.video_id, upload.format, upload.resolution)
            .part(
                "manifest",
                Part::bytes(upload.manifest.to_vec()).file_name(upload.manifest_name.clone()),
            )
            .part(
                "segment",
                Part::bytes(upload.segment.to_vec()).file_name(upload.segment_name.clone()),
            );
        self.post_upload("video/live/segment", form).await
    }

    async fn remove_live_segment(
        &self,
        video_id: &str,
        format: OutputFormat,
        resolution: Resolution,
        segment_name: &str,
    ) -> EngineResult<()> {
        self.post_status(
            "video/live/segment/remove",
            json!({
                "videoId": video_id,
                "format": format,
                "resolution": resolution,
                "segmentName": segment_name,
            }),
        )
        .await
    }

    async fn set_source_extension(&self, video_id: &str, extension: &str) -> EngineResult<()> {
        self.post_status(
            "video/source-extension",
            json!({ "videoId": video_id, "sourceFileExtension": extension }),
        )
        .await
    }

    async fn set_lengths(
        &self,
        video_id: &str,
        length_seconds: u64,
        length_timestamp: &str,
    ) -> EngineResult<()> {
        self.post_status(
            "video/lengths",
            json!({
                "videoId": video_id,
                "lengthSeconds": length_seconds,
                "lengthTimestamp": length_timestamp,
            }),
        )
        .await
    }

    async fn stop_streaming(&self, video_id: &str) -> EngineResult<()> {
        self.post_status("video/stream/stop", json!({ "videoId": video_id }))
            .await
    }

    async fn upload_image(
        &self,
        video_id: &str,
        kind: ImageKind,
        path: &Path,
    ) -> EngineResult<()> {
        let file_name = format!("{}.jpg", kind.as_str());
        let form = Form::new()
            .text("videoId", video_id.to_string())
            .text("kind", kind.as_str())
            .part("image", file_part(&file_name, path).await?);
        self.post_upload("video/image", form).await
    }
}

#[async_trait]
impl EventSink for HttpNodeClient {
    async fn broadcast(&self, notification: Notification) -> EngineResult<()> {
        let body = serde_json::to_value(&notification)
            .map_err(|e| EngineError::RemoteNotificationFailed(e.to_string()))?;
        self.post_status("broadcast", body).await
    }
}
