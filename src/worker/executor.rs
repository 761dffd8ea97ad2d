use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ConverterCommand;
use crate::pipeline::job::{ConvertOutput, ConvertRequest};

/// How one conversion attempt ended, before lifecycle mapping.
#[derive(Debug)]
pub enum ExecOutcome {
    /// Converter exited cleanly and produced a result document
    Completed(ConvertOutput),
    /// Converter ran but reported an error for this input
    ConversionFailed(String),
    /// The child process died: killed by a signal, failed to spawn, or
    /// produced unreadable output
    Crashed(String),
    /// We killed it: deadline elapsed or the service is shutting down
    Terminated,
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub outcome: ExecOutcome,
}

/// Runs conversions in isolated child processes.
///
/// The payload goes to the child's stdin, conversion hints travel as
/// `CONVERTD_*` environment variables, and the child prints one JSON object
/// on stdout. The child holds no state between jobs; killing it is always
/// safe and is the only form of cancellation the converter supports.
/// How long to wait for the output pipes after the child has exited. The
/// pipes close with the child unless it leaked them to a grandchild, in
/// which case waiting longer buys nothing.
const OUTPUT_DRAIN_LIMIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConvertExecutor {
    command: ConverterCommand,
}

impl ConvertExecutor {
    pub fn new(command: ConverterCommand) -> Self {
        Self { command }
    }

    /// Run one conversion. Resolves when the child exits or when `cancel`
    /// fires, in which case the child is killed with SIGKILL and
    /// [`ExecOutcome::Terminated`] is returned.
    pub async fn execute(
        &self,
        job_id: Uuid,
        request: &ConvertRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .env(
                "CONVERTD_KEEP_DATA_URIS",
                if request.options.keep_data_uris { "1" } else { "0" },
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Reaped even if this task is aborted mid-flight
            .kill_on_drop(true);
        if let Some(ext) = &request.options.file_extension {
            cmd.env("CONVERTD_EXTENSION", ext.trim_start_matches('.'));
        }
        if let Some(mimetype) = &request.options.mimetype {
            cmd.env("CONVERTD_MIMETYPE", mimetype);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "failed to spawn converter");
                return ExecutionResult {
                    job_id,
                    outcome: ExecOutcome::Crashed(format!("failed to spawn converter: {e}")),
                };
            }
        };

        // Drain stdout/stderr concurrently so a chatty child cannot deadlock
        // against our stdin write on full pipe buffers.
        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));
        let mut stdin = child.stdin.take();
        let bytes = request.bytes.as_slice();
        let feed = async move {
            if let Some(mut pipe) = stdin.take() {
                // The child may exit without reading; a broken pipe here is
                // its problem to report, not ours.
                let _ = pipe.write_all(bytes).await;
                let _ = pipe.shutdown().await;
            }
        };

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::debug!(job_id = %job_id, "converter process killed");
                return ExecutionResult { job_id, outcome: ExecOutcome::Terminated };
            }
            status = async { feed.await; child.wait().await } => status,
        };

        // The child is gone, but a grandchild it spawned may still hold the
        // write ends of the pipes open; the drain must not hang on that.
        let drained = tokio::time::timeout(OUTPUT_DRAIN_LIMIT, async {
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match drained {
            Ok(output) => output,
            Err(_) => {
                stdout_task.abort();
                stderr_task.abort();
                tracing::warn!(job_id = %job_id, "converter exited but left its output pipes open");
                return ExecutionResult {
                    job_id,
                    outcome: ExecOutcome::Crashed(
                        "converter left its output pipes open after exit".to_string(),
                    ),
                };
            }
        };
        let outcome = match status {
            Ok(status) => interpret(status, &stdout, &stderr),
            Err(e) => ExecOutcome::Crashed(format!("failed to reap converter: {e}")),
        };
        ExecutionResult { job_id, outcome }
    }
}

fn interpret(status: std::process::ExitStatus, stdout: &[u8], stderr: &[u8]) -> ExecOutcome {
    if status.success() {
        return match serde_json::from_slice::<ConvertOutput>(stdout) {
            Ok(output) => ExecOutcome::Completed(output),
            Err(e) => ExecOutcome::Crashed(format!("converter produced malformed output: {e}")),
        };
    }
    match status.code() {
        // No exit code means the process was killed by a signal (OOM kill,
        // segfault in native conversion code, ...)
        None => ExecOutcome::Crashed("converter terminated by signal".to_string()),
        Some(code) => {
            let message = String::from_utf8_lossy(stderr).trim().to_string();
            ExecOutcome::ConversionFailed(if message.is_empty() {
                format!("converter exited with code {code}")
            } else {
                message
            })
        }
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}
