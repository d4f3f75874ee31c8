//! Encode progress from the encoder's diagnostic stream.
//!
//! The encoder prints `Duration: HH:MM:SS.ff` once, then status lines with
//! `time=HH:MM:SS.ff` terminated by `\r`. Chunks can split a line anywhere.

use regex::Regex;
use std::sync::OnceLock;

/// Encoding owns the first half of the progress bar; upload owns the rest.
pub const ENCODE_SHARE: u8 = 50;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration: (\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
    })
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid time regex"))
}

fn seconds(caps: &regex::Captures<'_>) -> Option<f64> {
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let secs: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + secs)
}

/// `ceil((current / duration) * 100 / 2)`, clamped to the encode share.
pub fn encode_progress(current: f64, duration: f64) -> u8 {
    if duration <= 0.0 || current <= 0.0 {
        return 0;
    }
    let value = ((current / duration) * 100.0 / 2.0).ceil();
    value.min(ENCODE_SHARE as f64) as u8
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    partial: String,
    duration: Option<f64>,
    last: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Feeds a stderr chunk; returns the new progress value when it moved forward.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<u8> {
        self.partial.push_str(&String::from_utf8_lossy(chunk));
        let mut updated = None;

        while let Some(end) = self.partial.find(['\n', '\r']) {
            let line: String = self.partial.drain(..=end).collect();
            if let Some(progress) = self.observe(&line) {
                updated = Some(progress);
            }
        }
        updated
    }

    fn observe(&mut self, line: &str) -> Option<u8> {
        if self.duration.is_none() {
            if let Some(caps) = duration_re().captures(line) {
                self.duration = seconds(&caps);
                return None;
            }
        }
        let duration = self.duration?;
        let current = time_re().captures(line).and_then(|caps| seconds(&caps))?;
        let progress = encode_progress(current, duration);
        if progress > self.last {
            self.last = progress;
            Some(progress)
        } else {
            None
        }
    }
}
