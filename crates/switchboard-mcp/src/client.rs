//! MCP client for communicating with a single MCP server.

use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::ToolConnection;
use crate::environment::EnvOverride;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, ListToolsResult, ServerInfo, ToolInfo,
};
use crate::transport::StdioTransport;

/// Default bound for handshake and listing requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Declarative configuration for one MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServerConfig {
    /// Unique routing key.
    pub key: String,
    /// Display label.
    pub label: String,
    /// Runner name (`npx`, `uvx`) or executable name/path.
    pub command: String,
    /// Arguments, before rewrite rules are applied.
    pub args: Vec<String>,
    /// Environment overrides. A `None` value removes the variable.
    pub env: Vec<EnvOverride>,
}

impl McpServerConfig {
    /// Create a config whose label equals its key.
    pub fn new(key: impl Into<String>, command: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Replace the arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), Some(value.into())));
        self
    }

    /// Remove an inherited environment variable.
    pub fn without_env_var(mut self, key: impl Into<String>) -> Self {
        self.env.push((key.into(), None));
        self
    }
}

/// An MCP client connected to a single MCP server over stdio.
pub struct McpClient {
    key: String,
    transport: StdioTransport,
    server_info: Option<ServerInfo>,
    request_id: AtomicU64,
    request_timeout: Duration,
}

impl McpClient {
    /// Spawn the server process.
    ///
    /// This does NOT initialize the connection - call `initialize()` after launching.
    pub fn launch(
        key: &str,
        program: &Path,
        args: &[String],
        env: &[(OsString, OsString)],
        request_timeout: Duration,
    ) -> Result<Self> {
        let transport = StdioTransport::spawn(key, program, args, env)?;

        tracing::info!(
            server = %key,
            command = %program.display(),
            "launched MCP server via stdio"
        );

        Ok(Self {
            key: key.to_string(),
            transport,
            server_info: None,
            request_id: AtomicU64::new(1),
            request_timeout,
        })
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.server_info.is_some()
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        let response = self.transport.request(&request, timeout).await?;

        response
            .into_result()
            .map_err(|e| McpError::server_error(e.code, e.message, e.data))
    }

    /// Perform the MCP handshake: `initialize`, then `notifications/initialized`.
    pub async fn initialize(&mut self) -> Result<&ServerInfo> {
        if self.server_info.is_some() {
            return self.server_info.as_ref().ok_or(McpError::NotInitialized);
        }

        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self
            .send_request("initialize", Some(params), self.request_timeout)
            .await?;
        let init_result: InitializeResult = serde_json::from_value(result)?;

        tracing::info!(
            server = %self.key,
            name = %init_result.server_info.name,
            version = %init_result.server_info.version,
            protocol = %init_result.protocol_version,
            "MCP server initialized"
        );

        self.transport
            .notify(&JsonRpcNotification::new("notifications/initialized", None))
            .await?;

        Ok(self.server_info.insert(init_result.server_info))
    }

    /// List available tools, waiting at most `timeout`.
    pub async fn list_tools_within(&self, timeout: Duration) -> Result<Vec<ToolInfo>> {
        if !self.is_initialized() {
            return Err(McpError::NotInitialized);
        }

        let result = self.send_request("tools/list", None, timeout).await?;
        let list_result: ListToolsResult = serde_json::from_value(result)?;

        tracing::debug!(
            server = %self.key,
            tool_count = list_result.tools.len(),
            "listed MCP tools"
        );

        Ok(list_result.tools)
    }

    /// Call a tool on the server, waiting at most `timeout`.
    pub async fn call_tool_within(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<CallToolResult> {
        if !self.is_initialized() {
            return Err(McpError::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?), timeout)
            .await?;
        let call_result: CallToolResult = serde_json::from_value(result)?;

        if call_result.is_error() {
            tracing::warn!(server = %self.key, tool = %name, "tool call returned error");
        } else {
            tracing::debug!(server = %self.key, tool = %name, "tool call succeeded");
        }

        Ok(call_result)
    }
}

#[async_trait]
impl ToolConnection for McpClient {
    fn key(&self) -> &str {
        &self.key
    }

    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolInfo>> {
        self.list_tools_within(timeout).await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<CallToolResult> {
        self.call_tool_within(name, arguments, timeout).await
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!(server = %self.key, "shutting down MCP client");
        self.transport.shutdown().await
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("key", &self.key)
            .field("server_info", &self.server_info)
            .field("transport", &self.transport)
            .finish()
    }
}
