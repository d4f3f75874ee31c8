use std::path::{Path, PathBuf};

use crate::domain::jobs::{OutputFormat, Resolution};
use crate::error::{EngineError, EngineResult};
use crate::ports::node::ArtifactFile;

/// Per-video working directory layout under one root.
///
/// ```text
/// <id>/source/
/// <id>/images/
/// <id>/adaptive/<format>/<resolution>/
/// <id>/progressive/<format>/<resolution>/
/// ```
#[derive(Debug, Clone)]
pub struct WorkingDirs {
    root: PathBuf,
}

impl WorkingDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn video_dir(&self, video_id: &str) -> PathBuf {
        self.root.join(video_id)
    }

    pub fn source_dir(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("source")
    }

    pub fn images_dir(&self, video_id: &str) -> PathBuf {
        self.video_dir(video_id).join("images")
    }

    pub fn source_file(&self, video_id: &str, extension: &str) -> PathBuf {
        self.source_dir(video_id)
            .join(format!("{}.{}", video_id, extension))
    }

    /// Local recording of a live stream.
    pub fn recording_file(&self, video_id: &str) -> PathBuf {
        self.source_file(video_id, "ts")
    }

    pub fn output_dir(
        &self,
        video_id: &str,
        format: OutputFormat,
        resolution: Resolution,
    ) -> PathBuf {
        let family = if format.is_adaptive() {
            "adaptive"
        } else {
            "progressive"
        };
        self.video_dir(video_id)
            .join(family)
            .join(format.as_str())
            .join(resolution.as_str())
    }

    pub async fn ensure(&self, dir: &Path) -> EngineResult<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| EngineError::io(dir, e))
    }

    /// Empties `dir`, creating it when missing.
    pub async fn reset(&self, dir: &Path) -> EngineResult<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(EngineError::io(dir, e)),
        }
        self.ensure(dir).await
    }

    /// Regular files directly inside `dir`, sorted by name.
    pub async fn list_files(&self, dir: &Path) -> EngineResult<Vec<ArtifactFile>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| EngineError::io(dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::io(dir, e))?
        {
            let path = entry.path();
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                files.push(ArtifactFile {
                    name: name.to_string(),
                    path: path.clone(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout() {
        let dirs = WorkingDirs::new("/w");
        assert_eq!(dirs.source_file("v1", "mkv"), PathBuf::from("/w/v1/source/v1.mkv"));
        assert_eq!(dirs.recording_file("v1"), PathBuf::from("/w/v1/source/v1.ts"));
        assert_eq!(dirs.images_dir("v1"), PathBuf::from("/w/v1/images"));
        assert_eq!(
            dirs.output_dir("v1", OutputFormat::Hls, Resolution::P720),
            PathBuf::from("/w/v1/adaptive/hls/720p")
        );
        assert_eq!(
            dirs.output_dir("v1", OutputFormat::Webm, Resolution::P360),
            PathBuf::from("/w/v1/progressive/webm/360p")
        );
    }

    #[tokio::test]
    async fn lists_only_files_sorted() {
        let temp = tempdir().unwrap();
        let dirs = WorkingDirs::new(temp.path());
        let out = dirs.output_dir("v1", OutputFormat::Hls, Resolution::P240);
        dirs.ensure(&out).await.unwrap();
        tokio::fs::write(out.join("segment-240p-1.ts"), b"b").await.unwrap();
        tokio::fs::write(out.join("manifest-240p.m3u8"), b"m").await.unwrap();
        tokio::fs::create_dir(out.join("nested")).await.unwrap();

        let names: Vec<_> = dirs
            .list_files(&out)
            .await
            .unwrap()
            .into_iter()
            .map(|file| file.name)
            .collect();
        assert_eq!(names, vec!["manifest-240p.m3u8", "segment-240p-1.ts"]);
    }

    #[tokio::test]
    async fn reset_discards_stale_output() {
        let temp = tempdir().unwrap();
        let dirs = WorkingDirs::new(temp.path());
        let out = dirs.output_dir("v1", OutputFormat::Mp4, Resolution::P480);
        dirs.reset(&out).await.unwrap();
        tokio::fs::write(out.join("480p.mp4"), b"partial").await.unwrap();
        dirs.reset(&out).await.unwrap();
        assert!(dirs.list_files(&out).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let temp = tempdir().unwrap();
        let dirs = WorkingDirs::new(temp.path());
        let err = dirs.list_files(&temp.path().join("absent")).await.unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
