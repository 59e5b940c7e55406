//! External MCP server reached over stdio
//!
//! The child process is spawned lazily on first use and spoken to with
//! newline-delimited JSON-RPC. One exchange runs at a time.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ChainError, Result, TransportError};
use crate::handler::McpHandler;
use crate::protocol::{methods, JsonRpcRequest, PROTOCOL_VERSION};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct ExternalServer {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    request_timeout: Duration,
    next_id: AtomicI64,
    process: Mutex<Option<ServerProcess>>,
}

impl ExternalServer {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            next_id: AtomicI64::new(1),
            process: Mutex::new(None),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn is_connected(&self) -> bool {
        self.process.lock().await.is_some()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn start(&self) -> Result<ServerProcess> {
        info!(
            "Starting external server '{}': {} {:?}",
            self.name, self.command, self.args
        );
        let mut process = ServerProcess::spawn(
            &self.command,
            &self.args,
            &self.env,
            self.working_dir.as_ref(),
        )?;

        let initialize = JsonRpcRequest::new(
            self.next_id(),
            methods::INITIALIZE,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        );
        let response = self
            .bounded(process.exchange(&serde_json::to_value(&initialize)?))
            .await?;
        debug!("Server '{}' initialized: {}", self.name, response);

        let initialized = JsonRpcRequest::notification(methods::INITIALIZED);
        process.send(&serde_json::to_value(&initialized)?).await?;

        Ok(process)
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            })?
    }

    /// Runs one exchange on the live process, spawning it first if needed.
    /// A process that fails mid-exchange is dropped so the next call starts
    /// a fresh one.
    async fn exchange(&self, message: &Value) -> Result<Value> {
        let mut slot = self.process.lock().await;
        if slot.is_none() {
            *slot = Some(self.start().await?);
        }
        let Some(process) = slot.as_mut() else {
            return Err(TransportError::Closed.into());
        };

        let is_notification = message.get("id").is_none();
        let outcome = if is_notification {
            process.send(message).await.map(|()| json!({}))
        } else {
            self.bounded(process.exchange(message)).await
        };

        if outcome.is_err() {
            warn!("Dropping connection to '{}' after failed exchange", self.name);
            *slot = None;
        }
        outcome
    }

    /// Stops the server: closes stdin, sends SIGTERM, and kills it if it is
    /// still running after a grace period.
    pub async fn disconnect(&self) {
        if let Some(process) = self.process.lock().await.take() {
            info!("Stopping external server '{}'", self.name);
            process.shutdown().await;
        }
    }
}

#[async_trait]
impl McpHandler for ExternalServer {
    async fn get_metadata(&self) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST, json!({}));
        let response = self.exchange(&serde_json::to_value(&request)?).await?;

        let tools = response
            .pointer("/result/tools")
            .cloned()
            .unwrap_or_else(|| json!([]));

        Ok(json!({
            "tools": tools,
            "server_name": self.name,
        }))
    }

    async fn handle_request(&self, request: Value) -> Result<Value> {
        self.exchange(&request).await
    }
}

struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ServerProcess {
    fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        working_dir: Option<&PathBuf>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TransportError::ConnectionFailed(format!("Failed to spawn '{command}': {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("Failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("Failed to get stdout".into()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        })
    }

    async fn send(&mut self, message: &Value) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        stdin
            .write_all(&line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Next response to the request with the given id. Server-initiated
    /// notifications and requests are skipped.
    async fn recv(&mut self, id: &Value) -> Result<Value> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            if n == 0 {
                return Err(TransportError::Closed.into());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: Value = serde_json::from_str(trimmed)?;
            if message.get("method").is_none() && message.get("id") == Some(id) {
                return Ok(message);
            }
            debug!("Skipping unsolicited server message: {}", trimmed);
        }
    }

    async fn exchange(&mut self, message: &Value) -> Result<Value> {
        self.send(message).await?;
        self.recv(&message["id"]).await
    }

    async fn shutdown(mut self) {
        // Closing stdin is the polite way to ask an MCP server to exit.
        drop(self.stdin.take());

        terminate(&self.child);

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("External server exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for external server: {}", e),
            Err(_) => {
                warn!("External server ignored SIGTERM, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill external server: {}", e);
                }
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}
