//! Progress and status notifications pushed to the node and local listeners.

use serde::{Deserialize, Serialize};

use super::jobs::{OutputFormat, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishPhase {
    Queued,
    Encoding,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Thumbnail,
    Preview,
    Poster,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [ImageKind::Thumbnail, ImageKind::Preview, ImageKind::Poster];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Thumbnail => "thumbnail",
            ImageKind::Preview => "preview",
            ImageKind::Poster => "poster",
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageKind::Thumbnail => (100, 100),
            ImageKind::Preview => (512, 288),
            ImageKind::Poster => (1280, 720),
        }
    }
}

/// Serialized as `{"type": "...", "videoId": "...", ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Notification {
    Publishing {
        video_id: String,
        format: OutputFormat,
        resolution: Resolution,
        phase: PublishPhase,
        progress: u8,
    },
    Published {
        video_id: String,
        length_seconds: u64,
        length_timestamp: String,
    },
    PublishFailed {
        video_id: String,
        format: OutputFormat,
        resolution: Resolution,
        reason: String,
    },
    Streaming {
        video_id: String,
        resolution: Resolution,
        segment_index: u64,
        bandwidth_bps: u64,
        length_seconds: f64,
    },
    StreamingStopped {
        video_id: String,
    },
    ImageUpdated {
        video_id: String,
        kind: ImageKind,
    },
}

impl Notification {
    pub fn video_id(&self) -> &str {
        match self {
            Notification::Publishing { video_id, .. }
            | Notification::Published { video_id, .. }
            | Notification::PublishFailed { video_id, .. }
            | Notification::Streaming { video_id, .. }
            | Notification::StreamingStopped { video_id }
            | Notification::ImageUpdated { video_id, .. } => video_id,
        }
    }
}

/// Formats whole seconds as `HH:MM:SS`.
pub fn length_timestamp(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
