//! Agent configuration from the environment (and an optional `.env` file).

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::domain::encoding::HardwareSelection;
use crate::domain::hls::demuxer::DEFAULT_MAX_BUFFERED;

/// Knobs of the VOD publish scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Default concurrency limit, restored whenever the scheduler goes idle
    pub concurrency: usize,
    pub tick: Duration,
    /// Period of the "queued" progress broadcast for waiting jobs
    pub idle_progress: Duration,
    pub segment_seconds: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            tick: Duration::from_millis(3000),
            idle_progress: Duration::from_millis(1000),
            segment_seconds: 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSettings {
    pub rtmp_host: String,
    pub rtmp_port: u16,
    pub segment_seconds: u32,
    /// Segments kept on the node when the stream is not recorded remotely
    pub window: u64,
    pub max_sessions: usize,
    /// Encoder output held without a validated segment before the session is failed
    pub max_demux_buffer: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            rtmp_host: String::from("127.0.0.1"),
            rtmp_port: 1935,
            segment_seconds: 6,
            window: 20,
            max_sessions: 4,
            max_demux_buffer: DEFAULT_MAX_BUFFERED,
        }
    }
}

impl LiveSettings {
    pub fn rtmp_url(&self, video_id: &str) -> String {
        format!("rtmp://{}:{}/live/{}", self.rtmp_host, self.rtmp_port, video_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotSettings {
    /// Minimum time between two extraction attempts of one session
    pub spacing: Duration,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            spacing: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub encoder: String,
    pub prober: String,
    pub work_dir: PathBuf,
    pub node_url: String,
    pub node_token: String,
    pub hardware: HardwareSelection,
    pub scheduler: SchedulerSettings,
    pub live: LiveSettings,
    pub snapshot: SnapshotSettings,
}

impl AgentConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let parsed = |name: &str, default| parse_or(name, lookup(name), default);

        let scheduler_defaults = SchedulerSettings::default();
        let live_defaults = LiveSettings::default();
        let segment_seconds = parsed("RELAYCAST_SEGMENT_SECONDS", 6u64).max(1) as u32;

        Self {
            encoder: text("RELAYCAST_ENCODER", "ffmpeg"),
            prober: text("RELAYCAST_PROBER", "ffprobe"),
            work_dir: PathBuf::from(text("RELAYCAST_WORK_DIR", "./media")),
            node_url: text("RELAYCAST_NODE_URL", "http://127.0.0.1:8181"),
            node_token: text("RELAYCAST_NODE_TOKEN", ""),
            hardware: parse_or("RELAYCAST_HARDWARE", lookup("RELAYCAST_HARDWARE"), HardwareSelection::Auto),
            scheduler: SchedulerSettings {
                concurrency: parsed("RELAYCAST_CONCURRENCY", scheduler_defaults.concurrency as u64).max(1)
                    as usize,
                tick: Duration::from_millis(parsed("RELAYCAST_TICK_MS", 3000).max(1)),
                idle_progress: Duration::from_millis(parsed("RELAYCAST_IDLE_PROGRESS_MS", 1000).max(1)),
                segment_seconds,
            },
            live: LiveSettings {
                rtmp_host: text("RELAYCAST_RTMP_HOST", &live_defaults.rtmp_host),
                rtmp_port: parse_or("RELAYCAST_RTMP_PORT", lookup("RELAYCAST_RTMP_PORT"), live_defaults.rtmp_port),
                segment_seconds,
                window: parsed("RELAYCAST_LIVE_WINDOW", live_defaults.window).max(1),
                max_sessions: parsed("RELAYCAST_MAX_LIVE_SESSIONS", live_defaults.max_sessions as u64).max(1)
                    as usize,
                max_demux_buffer: parsed("RELAYCAST_LIVE_MAX_BUFFER_BYTES", live_defaults.max_demux_buffer as u64)
                    .max(1) as usize,
            },
            snapshot: SnapshotSettings {
                spacing: Duration::from_secs(parsed("RELAYCAST_SNAPSHOT_SPACING_SECS", 10)),
            },
        }
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!(variable = name, value = %raw, error = %e, "invalid setting, using default");
            default
        }),
    }
}
