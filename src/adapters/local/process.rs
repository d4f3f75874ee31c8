use std::io;
use std::process::Stdio;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::ports::process::{
    ProcessEvent, ProcessHandle, ProcessLauncher, ProcessStdin, StdinMode,
};

const READ_CHUNK: usize = 64 * 1024;

/// Runs encoder/prober binaries as tokio child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(program: &str, source: io::Error) -> EngineError {
    match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            EngineError::EncoderUnavailable {
                program: program.to_string(),
                source,
            }
        }
        _ => EngineError::io(program, source),
    }
}

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(
        &self,
        program: &str,
        args: &[String],
        stdin: StdinMode,
    ) -> EngineResult<ProcessHandle> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(match stdin {
                StdinMode::Piped => Stdio::piped(),
                StdinMode::Null => Stdio::null(),
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| spawn_error(program, source))?;
        debug!(program, pid = ?child.id(), "process started");

        let (sender, events) = tokio::sync::mpsc::unbounded_channel();
        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, sender.clone(), ProcessEvent::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, sender.clone(), ProcessEvent::Stderr)));
        let child_stdin = child
            .stdin
            .take()
            .map(|input| Box::new(input) as ProcessStdin);

        let kill = CancellationToken::new();
        tokio::spawn(supervise(
            child,
            [stdout, stderr],
            sender,
            kill.clone(),
            program.to_string(),
        ));
        Ok(ProcessHandle::new(events, child_stdin, kill))
    }
}

/// Drains one pipe to the end even after the receiver went away, so the child never blocks on a full pipe.
async fn pump<R>(mut reader: R, sender: UnboundedSender<ProcessEvent>, wrap: fn(Bytes) -> ProcessEvent)
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let _ = sender.send(wrap(buf.freeze()));
            }
            Err(e) => {
                debug!(error = %e, "pipe read failed");
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    readers: [Option<JoinHandle<()>>; 2],
    sender: UnboundedSender<ProcessEvent>,
    kill: CancellationToken,
    program: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            if let Err(e) = child.start_kill() {
                warn!(program = %program, error = %e, "failed to kill process");
            }
            child.wait().await
        }
    };

    // Exited is the last event: flush both pipes first.
    for reader in readers.into_iter().flatten() {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(program = %program, error = %e, "failed to reap process");
            None
        }
    };
    debug!(program = %program, ?code, "process exited");
    let _ = sender.send(ProcessEvent::Exited(code));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let handle = TokioProcessLauncher::new()
            .launch("sh", &sh("printf out; printf err >&2; exit 3"), StdinMode::Null)
            .unwrap();
        let output = handle.wait_output().await;
        assert_eq!(output.stdout, b"out");
        assert_eq!(output.stderr, b"err");
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn piped_stdin_reaches_the_child() {
        let mut handle = TokioProcessLauncher::new()
            .launch("cat", &[], StdinMode::Piped)
            .unwrap();
        let mut stdin = handle.take_stdin().unwrap();
        stdin.write_all(b"segment bytes").await.unwrap();
        stdin.shutdown().await.unwrap();
        drop(stdin);
        let output = handle.wait_output().await;
        assert_eq!(output.stdout, b"segment bytes");
        assert!(output.success());
    }

    #[tokio::test]
    async fn kill_ends_a_long_running_process() {
        let handle = TokioProcessLauncher::new()
            .launch("sleep", &["30".to_string()], StdinMode::Null)
            .unwrap();
        handle.kill_switch().kill();
        let output = handle.wait_output().await;
        assert_eq!(output.code, None);
    }

    #[tokio::test]
    async fn missing_binary_is_an_operator_fault() {
        let err = TokioProcessLauncher::new()
            .launch("/nonexistent/relaycast-encoder", &[], StdinMode::Null)
            .err()
            .unwrap();
        assert!(err.is_operator_fault());
    }
}
