//! In-memory fakes shared by the application tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::domain::events::{ImageKind, Notification};
use crate::domain::jobs::{OutputFormat, Resolution};
use crate::error::{EngineError, EngineResult};
use crate::ports::node::{ArtifactBundle, LiveSegmentUpload, NodePort};
use crate::ports::process::{ProcessEvent, ProcessHandle, ProcessLauncher, StdinMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: StdinMode,
}

pub enum Script {
    /// Delivered at once, then the stream ends.
    Events(Vec<ProcessEvent>),
    /// Driven by the test through a [`Controller`].
    Held,
    Unavailable,
}

impl Script {
    pub fn output(stdout: &str, stderr: &str, code: i32) -> Script {
        let mut events = Vec::new();
        if !stdout.is_empty() {
            events.push(ProcessEvent::Stdout(Bytes::from(stdout.to_string())));
        }
        if !stderr.is_empty() {
            events.push(ProcessEvent::Stderr(Bytes::from(stderr.to_string())));
        }
        events.push(ProcessEvent::Exited(Some(code)));
        Script::Events(events)
    }

    pub fn exit(code: i32) -> Script {
        Script::output("", "", code)
    }
}

#[derive(Clone)]
pub struct Controller {
    sender: UnboundedSender<ProcessEvent>,
    kill: CancellationToken,
}

impl Controller {
    pub fn stdout(&self, bytes: impl Into<Bytes>) {
        let _ = self.sender.send(ProcessEvent::Stdout(bytes.into()));
    }

    pub fn exit(&self, code: Option<i32>) {
        let _ = self.sender.send(ProcessEvent::Exited(code));
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }
}

type Responder = Box<dyn Fn(&str, &[String]) -> Script + Send + Sync>;

pub struct ScriptedLauncher {
    respond: Responder,
    invocations: Mutex<Vec<Invocation>>,
    controllers: Mutex<Vec<Controller>>,
}

impl ScriptedLauncher {
    pub fn new(respond: impl Fn(&str, &[String]) -> Script + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            invocations: Mutex::new(Vec::new()),
            controllers: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(|_, _| Script::Unavailable)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn launched(&self, program: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|call| call.program == program)
            .count()
    }

    pub fn controller(&self, index: usize) -> Controller {
        self.controllers.lock().unwrap()[index].clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(
        &self,
        program: &str,
        args: &[String],
        stdin: StdinMode,
    ) -> EngineResult<ProcessHandle> {
        self.invocations.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            stdin,
        });

        let (sender, events) = mpsc::unbounded_channel();
        let kill = CancellationToken::new();
        match (self.respond)(program, args) {
            Script::Unavailable => {
                return Err(EngineError::EncoderUnavailable {
                    program: program.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
            Script::Events(scripted) => {
                for event in scripted {
                    let _ = sender.send(event);
                }
            }
            Script::Held => {
                let watcher = sender.clone();
                let killed = kill.clone();
                tokio::spawn(async move {
                    killed.cancelled().await;
                    let _ = watcher.send(ProcessEvent::Exited(None));
                });
                self.controllers.lock().unwrap().push(Controller {
                    sender,
                    kill: kill.clone(),
                });
            }
        }

        let input = match stdin {
            StdinMode::Piped => {
                Some(Box::new(tokio::io::sink()) as crate::ports::process::ProcessStdin)
            }
            StdinMode::Null => None,
        };
        Ok(ProcessHandle::new(events, input, kill))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeCall {
    MarkPublishing(String),
    MarkPublished {
        video_id: String,
        length_seconds: u64,
        length_timestamp: String,
    },
    UploadArtifacts {
        video_id: String,
        files: Vec<String>,
    },
    UploadLiveSegment {
        video_id: String,
        manifest_name: String,
        segment_name: String,
    },
    RemoveLiveSegment {
        video_id: String,
        segment_name: String,
    },
    SetSourceExtension {
        video_id: String,
        extension: String,
    },
    SetLengths {
        video_id: String,
        length_seconds: u64,
    },
    StopStreaming(String),
    UploadImage {
        video_id: String,
        kind: ImageKind,
    },
}

/// Node fake that records every call; artifact uploads can be made to fail.
#[derive(Default)]
pub struct RecordingNode {
    calls: Mutex<Vec<NodeCall>>,
    failing_uploads: AtomicUsize,
}

impl RecordingNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&NodeCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NodePort for RecordingNode {
    async fn mark_publishing(&self, video_id: &str) -> EngineResult<()> {
        self.record(NodeCall::MarkPublishing(video_id.to_string()));
        Ok(())
    }

    async fn mark_published(
        &self,
        video_id: &str,
        length_seconds: u64,
        length_timestamp: &str,
    ) -> EngineResult<()> {
        self.record(NodeCall::MarkPublished {
            video_id: video_id.to_string(),
            length_seconds,
            length_timestamp: length_timestamp.to_string(),
        });
        Ok(())
    }

    async fn upload_artifacts(&self, bundle: &ArtifactBundle) -> EngineResult<()> {
        self.record(NodeCall::UploadArtifacts {
            video_id: bundle.video_id.clone(),
            files: bundle.files.iter().map(|file| file.name.clone()).collect(),
        });
        let failing = self.failing_uploads.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_uploads.store(failing - 1, Ordering::SeqCst);
            return Err(EngineError::UploadFailed("node unavailable".into()));
        }
        Ok(())
    }

    async fn upload_live_segment(&self, upload: &LiveSegmentUpload) -> EngineResult<()> {
        self.record(NodeCall::UploadLiveSegment {
            video_id: upload.video_id.clone(),
            manifest_name: upload.manifest_name.clone(),
            segment_name: upload.segment_name.clone(),
        });
        Ok(())
    }

    async fn remove_live_segment(
        &self,
        video_id: &str,
        _format: OutputFormat,
        _resolution: Resolution,
        segment_name: &str,
    ) -> EngineResult<()> {
        self.record(NodeCall::RemoveLiveSegment {
            video_id: video_id.to_string(),
            segment_name: segment_name.to_string(),
        });
        Ok(())
    }

    async fn set_source_extension(&self, video_id: &str, extension: &str) -> EngineResult<()> {
        self.record(NodeCall::SetSourceExtension {
            video_id: video_id.to_string(),
            extension: extension.to_string(),
        });
        Ok(())
    }

    async fn set_lengths(
        &self,
        video_id: &str,
        length_seconds: u64,
        _length_timestamp: &str,
    ) -> EngineResult<()> {
        self.record(NodeCall::SetLengths {
            video_id: video_id.to_string(),
            length_seconds,
        });
        Ok(())
    }

    async fn stop_streaming(&self, video_id: &str) -> EngineResult<()> {
        self.record(NodeCall::StopStreaming(video_id.to_string()));
        Ok(())
    }

    async fn upload_image(
        &self,
        video_id: &str,
        kind: ImageKind,
        _path: &std::path::Path,
    ) -> EngineResult<()> {
        self.record(NodeCall::UploadImage {
            video_id: video_id.to_string(),
            kind,
        });
        Ok(())
    }
}

/// Everything already sitting in a hub subscription.
pub fn drain(receiver: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
