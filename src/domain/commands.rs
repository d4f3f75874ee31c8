//! Commands accepted by the agent, one JSON object per line.

use serde::{Deserialize, Serialize};

use super::jobs::{OutputFormat, PublishJob, Resolution};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EngineCommand {
    /// One job per (format, resolution) pair.
    Publish {
        video_id: String,
        source_extension: String,
        auth_token: String,
        formats: Vec<OutputFormat>,
        resolutions: Vec<Resolution>,
    },
    StopPublishing {
        video_id: String,
    },
    StartLive {
        video_id: String,
        resolution: Resolution,
        #[serde(default)]
        record_locally: bool,
        #[serde(default)]
        record_remotely: bool,
    },
    StopLive {
        video_id: String,
    },
}

impl EngineCommand {
    pub fn publish_jobs(&self) -> Vec<PublishJob> {
        let EngineCommand::Publish {
            video_id,
            source_extension,
            auth_token,
            formats,
            resolutions,
        } = self
        else {
            return Vec::new();
        };
        formats
            .iter()
            .flat_map(|format| {
                resolutions.iter().map(move |resolution| {
                    PublishJob::new(
                        video_id.clone(),
                        *format,
                        *resolution,
                        source_extension.clone(),
                        auth_token.clone(),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_expands_every_pair() {
        let command: EngineCommand = serde_json::from_str(
            r#"{"type":"publish","videoId":"v1","sourceExtension":"mkv","authToken":"t",
                "formats":["hls","mp4"],"resolutions":["720p","360p"]}"#,
        )
        .unwrap();
        let jobs = command.publish_jobs();
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].describe(), "v1/hls/720p");
        assert_eq!(jobs[3].describe(), "v1/mp4/360p");
        assert!(jobs.iter().all(|job| job.source_extension == "mkv"));
    }

    #[test]
    fn live_flags_default_to_off() {
        let command: EngineCommand =
            serde_json::from_str(r#"{"type":"start_live","videoId":"v1","resolution":"1080p"}"#)
                .unwrap();
        assert_eq!(
            command,
            EngineCommand::StartLive {
                video_id: "v1".into(),
                resolution: Resolution::P1080,
                record_locally: false,
                record_remotely: false,
            }
        );
        assert!(command.publish_jobs().is_empty());
    }
}
