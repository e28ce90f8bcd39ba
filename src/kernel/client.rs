//! Client for a kernel child process.
//!
//! [`KernelClient::launch`] spawns the process described by a [`KernelSpec`]
//! with piped stdio and drives it through the wire protocol in
//! [`messages`](super::messages): one execute request per code cell, outputs
//! collected until the matching reply arrives.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};
use uuid::Uuid;

use super::messages::{KernelMessage, KernelRequest, ReplyStatus, parse_message};
use super::registry::KernelSpec;

/// How long to wait for the process to exit after a shutdown request
/// before killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Errors from spawning or talking to a kernel process.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The kernel command could not be started.
    #[error("failed to spawn kernel `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The kernel's stdio closed (or was never available) before it replied.
    #[error("kernel stdio closed unexpectedly")]
    Disconnected,

    /// A wire message could not be encoded or decoded.
    #[error("malformed kernel message: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Reading from or writing to the kernel pipes failed.
    #[error("kernel i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the kernel reported for one execute request.
#[derive(Debug)]
pub struct ExecuteOutcome {
    pub status: ReplyStatus,
    /// Output messages in arrival order, the terminating reply excluded.
    pub messages: Vec<KernelMessage>,
}

/// A live kernel child process.
///
/// The process is spawned with `kill_on_drop`, so dropping the client (e.g.
/// when a timeout abandons an execution mid-flight) tears the kernel down.
#[derive(Debug)]
pub struct KernelClient {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl KernelClient {
    /// Spawn the kernel process with `cwd` as its working directory.
    ///
    /// The working directory is how relative resource references inside the
    /// executed document resolve, so callers pass the document's own
    /// directory here.
    pub async fn launch(spec: &KernelSpec, cwd: &Path) -> Result<Self, KernelError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| KernelError::Spawn {
            command: spec.command.clone(),
            source,
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(KernelError::Disconnected);
        };

        debug!(kernel = %spec.name, command = %spec.command, "Kernel process started");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Execute one cell's code and collect everything the kernel reports
    /// for it, up to and including the terminating reply.
    pub async fn execute(&mut self, code: &str) -> Result<ExecuteOutcome, KernelError> {
        let id = Uuid::new_v4();
        self.send(&KernelRequest::Execute {
            id,
            code: code.to_string(),
        })
        .await?;

        let mut messages = Vec::new();
        loop {
            let mut line = String::new();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Err(KernelError::Disconnected);
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let msg = parse_message(line)?;
            if msg.id() != id {
                warn!(got = %msg.id(), expected = %id, "Dropping kernel message for another request");
                continue;
            }

            match msg {
                KernelMessage::Reply { status, .. } => {
                    return Ok(ExecuteOutcome { status, messages });
                }
                other => messages.push(other),
            }
        }
    }

    /// Ask the kernel to exit and reap the process, killing it if it
    /// ignores the request.
    pub async fn shutdown(mut self) -> Result<(), KernelError> {
        // The kernel may already be gone; a failed write is not interesting.
        if self.send(&KernelRequest::Shutdown).await.is_err() {
            debug!("Kernel was gone before the shutdown request");
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => {
                warn!("Kernel ignored shutdown, killing the process");
                self.child.kill().await?;
            }
        }

        Ok(())
    }

    async fn send(&mut self, request: &KernelRequest) -> Result<(), KernelError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}
