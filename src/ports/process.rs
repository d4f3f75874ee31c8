//! Supervision contract for one external encoder/prober invocation.

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    /// Always the last event; `None` when the process died from a signal.
    Exited(Option<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Null,
    Piped,
}

pub type ProcessStdin = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable handle that terminates the process unconditionally.
#[derive(Debug, Clone)]
pub struct KillSwitch(CancellationToken);

impl KillSwitch {
    pub fn kill(&self) {
        self.0.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Everything a finished process wrote, for short-lived invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub code: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub struct ProcessHandle {
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    stdin: Option<ProcessStdin>,
    kill: CancellationToken,
}

impl ProcessHandle {
    pub fn new(
        events: mpsc::UnboundedReceiver<ProcessEvent>,
        stdin: Option<ProcessStdin>,
        kill: CancellationToken,
    ) -> Self {
        Self {
            events,
            stdin,
            kill,
        }
    }

    /// Next output chunk or the exit; `None` once the exit has been consumed.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        self.events.recv().await
    }

    pub fn take_stdin(&mut self) -> Option<ProcessStdin> {
        self.stdin.take()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch(self.kill.clone())
    }

    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub async fn wait_output(mut self) -> CapturedOutput {
        let mut output = CapturedOutput::default();
        while let Some(event) = self.next_event().await {
            match event {
                ProcessEvent::Stdout(chunk) => output.stdout.extend_from_slice(&chunk),
                ProcessEvent::Stderr(chunk) => output.stderr.extend_from_slice(&chunk),
                ProcessEvent::Exited(code) => {
                    output.code = code;
                    break;
                }
            }
        }
        output
    }
}

/// Starts OS processes. The returned handle must be drained by the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, program: &str, args: &[String], stdin: StdinMode)
        -> EngineResult<ProcessHandle>;
}
