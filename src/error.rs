//! Engine error kinds.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("encoder exited with status {code:?}")]
    EncodingFailed { code: Option<i32> },
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("publishing is stopping")]
    PublishingStopping,
    #[error("remote notification failed: {0}")]
    RemoteNotificationFailed(String),
    #[error("cannot launch {program}: {source}")]
    EncoderUnavailable { program: String, source: io::Error },
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("probe failed: {0}")]
    Probe(String),
    #[error("a live session already exists for video {0}")]
    LiveSessionExists(String),
    #[error("live session capacity of {0} reached")]
    LiveCapacityReached(usize),
    #[error("no live session for video {0}")]
    UnknownLiveSession(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures a retry cannot fix; these go to the operator instead of the queue.
    pub fn is_operator_fault(&self) -> bool {
        matches!(self, EngineError::EncoderUnavailable { .. })
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        EngineError::UploadFailed(error.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_encoder_is_an_operator_fault() {
        let missing = EngineError::EncoderUnavailable {
            program: "ffmpeg".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert!(missing.is_operator_fault());
        assert!(!EngineError::EncodingFailed { code: Some(1) }.is_operator_fault());
        assert!(!EngineError::UploadFailed("timeout".into()).is_operator_fault());
        assert!(!EngineError::PublishingStopping.is_operator_fault());
    }

    #[test]
    fn display_includes_context() {
        let err = EngineError::io("/tmp/x", io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "io error at /tmp/x: boom");
        assert_eq!(
            EngineError::EncodingFailed { code: Some(137) }.to_string(),
            "encoder exited with status Some(137)"
        );
    }
}
