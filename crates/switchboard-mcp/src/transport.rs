//! Stdio transport for MCP communication.
//!
//! Messages are newline-delimited JSON. A single writer (an async mutex over
//! the child's stdin) sends requests; a background reader task owns stdout and
//! routes each response to the waiting request by id. When stdout reaches EOF
//! the transport is marked closed and every pending request fails with
//! [`McpError::ConnectionClosed`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};

/// How long a shutting-down server gets to exit after stdin closes.
const EXIT_GRACE: Duration = Duration::from_millis(500);

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>;
type SharedStdin = Arc<tokio::sync::Mutex<Option<ChildStdin>>>;

/// A launched MCP server process and its JSON-RPC channel.
pub struct StdioTransport {
    key: String,
    stdin: SharedStdin,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    child: Mutex<Option<Child>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn `program` with exactly the given environment.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        key: &str,
        program: &Path,
        args: &[String],
        env: &[(OsString, OsString)],
    ) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(program.display().to_string(), e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("failed to capture stdout"))?;

        let stdin: SharedStdin = Arc::new(tokio::sync::Mutex::new(Some(stdin)));
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let mut tasks = vec![tokio::spawn(read_loop(
            key.to_string(),
            stdout,
            stdin.clone(),
            pending.clone(),
            closed.clone(),
        ))];

        if let Some(stderr) = child.stderr.take() {
            let key = key.to_string();
            tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %key, "stderr: {}", line);
                }
            }));
        }

        tracing::debug!(
            server = %key,
            program = %program.display(),
            pid = ?child.id(),
            "spawned MCP server process"
        );

        Ok(Self {
            key: key.to_string(),
            stdin,
            pending,
            closed,
            child: Mutex::new(Some(child)),
            tasks: Mutex::new(tasks),
        })
    }

    /// Send a request and wait up to `timeout` for its response.
    pub async fn request(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request.id, tx);

        // The reader may have closed between the check above and the insert.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().remove(&request.id);
            return Err(McpError::ConnectionClosed);
        }

        if let Err(e) = self.write_line(&serde_json::to_string(request)?).await {
            self.pending.lock().remove(&request.id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&request.id);
                Err(McpError::timeout(&request.method, timeout))
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionClosed);
        }
        self.write_line(&serde_json::to_string(notification)?).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(McpError::ConnectionClosed)?;
        write_message(stdin, line).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                McpError::ConnectionClosed
            } else {
                McpError::transport(format!("failed to write to server: {}", e))
            }
        })
    }

    /// Whether the process is still running and its output stream open.
    pub fn is_connected(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Close stdin, give the process a moment to exit, then kill it.
    pub async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.stdin.lock().await.take();
        self.pending.lock().clear();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(status) => {
                    tracing::debug!(server = %self.key, status = ?status.ok(), "MCP server exited");
                }
                Err(_) => {
                    tracing::debug!(server = %self.key, "MCP server did not exit, killing");
                    child.kill().await?;
                }
            }
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // The child itself is reaped by kill_on_drop.
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("key", &self.key)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

async fn write_message(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn read_loop(
    key: String,
    stdout: ChildStdout,
    stdin: SharedStdin,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server = %key, error = %e, "error reading from MCP server");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<IncomingMessage>(line) {
            Ok(IncomingMessage::Response(response)) => {
                let waiter = pending.lock().remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        tracing::debug!(server = %key, id = response.id, "response with no waiting request");
                    }
                }
            }
            Ok(IncomingMessage::Request { id, method }) => {
                let reply = if method == "ping" {
                    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": {}})
                } else {
                    serde_json::json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {
                            "code": JsonRpcError::METHOD_NOT_FOUND,
                            "message": format!("method not supported by client: {}", method),
                        }
                    })
                };
                let mut guard = stdin.lock().await;
                if let Some(stdin) = guard.as_mut()
                    && let Err(e) = write_message(stdin, &reply.to_string()).await
                {
                    tracing::debug!(server = %key, error = %e, "failed to answer server request");
                }
            }
            Ok(IncomingMessage::Notification(note)) => {
                tracing::trace!(server = %key, method = %note.method, "server notification");
            }
            Err(_) => {
                tracing::debug!(server = %key, "ignoring non JSON-RPC output: {}", line);
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    let dropped = {
        let mut pending = pending.lock();
        let count = pending.len();
        pending.clear();
        count
    };
    tracing::debug!(server = %key, pending = dropped, "MCP server closed its output");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = StdioTransport::spawn(
            "missing",
            Path::new("nonexistent-mcp-server-12345"),
            &[],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, McpError::SpawnFailed { .. }));
        assert_eq!(err.hint(), crate::error::FailureHint::MissingExecutable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_request_fails_when_process_exits() {
        let path: OsString = std::env::var_os("PATH").unwrap_or_default();
        let transport = StdioTransport::spawn(
            "true",
            Path::new("true"),
            &[],
            &[(OsString::from("PATH"), path)],
        )
        .unwrap();

        let request = JsonRpcRequest::new(1, "tools/list", None);
        let err = transport
            .request(&request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed), "unexpected error: {err}");
        assert_eq!(err.hint(), crate::error::FailureHint::ExitedImmediately);
    }
}
