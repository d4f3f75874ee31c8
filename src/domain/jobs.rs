use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container/packaging produced by one publish job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Hls,
    Mp4,
    Webm,
    Ogv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Hls,
        OutputFormat::Mp4,
        OutputFormat::Webm,
        OutputFormat::Ogv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Hls => "hls",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Ogv => "ogv",
        }
    }

    /// Adaptive formats are written as manifest + segments, progressive ones as a single file.
    pub fn is_adaptive(&self) -> bool {
        matches!(self, OutputFormat::Hls)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("unknown output format: {}", s))
    }
}

/// The fixed resolution ladder, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
}

impl Resolution {
    pub const LADDER: [Resolution; 7] = [
        Resolution::P2160,
        Resolution::P1440,
        Resolution::P1080,
        Resolution::P720,
        Resolution::P480,
        Resolution::P360,
        Resolution::P240,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::P2160 => "2160p",
            Resolution::P1440 => "1440p",
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
            Resolution::P480 => "480p",
            Resolution::P360 => "360p",
            Resolution::P240 => "240p",
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Resolution::P2160 => 2160,
            Resolution::P1440 => 1440,
            Resolution::P1080 => 1080,
            Resolution::P720 => 720,
            Resolution::P480 => 480,
            Resolution::P360 => 360,
            Resolution::P240 => 240,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolution::LADDER
            .into_iter()
            .find(|resolution| resolution.as_str() == s)
            .ok_or_else(|| format!("unknown resolution: {}", s))
    }
}

/// One encode+upload unit of work for a (video, format, resolution) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishJob {
    pub video_id: String,
    pub format: OutputFormat,
    pub resolution: Resolution,
    /// Extension of the retained source file, without the dot
    pub source_extension: String,
    pub auth_token: String,
}

impl PublishJob {
    pub fn new(
        video_id: impl Into<String>,
        format: OutputFormat,
        resolution: Resolution,
        source_extension: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            format,
            resolution,
            source_extension: source_extension.into(),
            auth_token: auth_token.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{}/{}/{}", self.video_id, self.format, self.resolution)
    }
}
