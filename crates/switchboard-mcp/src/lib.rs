//! MCP (Model Context Protocol) connection manager and tool-call router.
//!
//! This crate launches every configured tool server as a child process,
//! discovers their tools, merges them into one namespace and routes the
//! model's tool calls back to the owning server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpSupervisor                                              │
//! │  - Rewrites args, skips toggled-off servers                 │
//! │  - Resolves runners, builds the child environment           │
//! │  - Reuses probed connections or launches new ones           │
//! └─────────────────────────────────────────────────────────────┘
//!                           │ Aggregate { registry, .. }
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ToolRegistry  ──►  Dispatcher                              │
//! │  name → server key     retries, timeouts, normalization     │
//! └─────────────────────────────────────────────────────────────┘
//!                           │ ToolConnection
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient / StdioTransport                                 │
//! │  - Newline-delimited JSON-RPC 2.0 over stdio                │
//! │  - initialize, tools/list, tools/call                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard_mcp::{Dispatcher, McpServerConfig, McpSupervisor, SupervisorOptions, ToolCall, ToolInvoker};
//!
//! let supervisor = McpSupervisor::new(SupervisorOptions::default());
//! let configs = vec![
//!     McpServerConfig::new("everything", "npx")
//!         .with_arg("-y")
//!         .with_arg("@modelcontextprotocol/server-everything"),
//! ];
//!
//! let aggregate = supervisor.connect_all(&configs, false).await;
//! let dispatcher = Dispatcher::new(Arc::new(aggregate.registry), supervisor.connections());
//!
//! let payload = dispatcher
//!     .invoke(ToolCall::new("echo", Some(json!({"message": "hi"}))))
//!     .await;
//! println!("{}", payload.content);
//! ```
//!
//! # MCP Protocol
//!
//! Each message is one line of JSON:
//!
//! ```text
//! {"jsonrpc": "2.0", "id": 1, "method": "tools/list"}\n
//! ```
//!
//! The protocol flow is:
//! 1. Client sends `initialize` with capabilities
//! 2. Server responds with its capabilities
//! 3. Client sends `notifications/initialized`
//! 4. Client can now call `tools/list` and `tools/call`

pub mod client;
pub mod connection;
pub mod content;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod rewrite;
pub mod runner;
pub mod supervisor;
pub mod transport;

// Re-export main types
pub use client::{DEFAULT_REQUEST_TIMEOUT, McpClient, McpServerConfig};
#[cfg(any(test, feature = "testing"))]
pub use connection::{MockConnection, MockOutcome};
pub use connection::{ConnectionSet, SharedConnection, ToolConnection};
pub use content::{EMPTY_CONTENT_TEXT, ToolContent};
pub use dispatch::{DispatchConfig, Dispatcher, ToolCall, ToolInvoker, ToolResultPayload};
pub use environment::{EnvOverride, build_child_env, child_env};
pub use error::{FailureHint, McpError, Result};
pub use protocol::{CallToolResult, ServerInfo, ToolInfo};
pub use registry::{RegisteredTool, ToolCollision, ToolRegistry};
pub use rewrite::{ALLOWED_DIRECTORIES_PLACEHOLDER, RewriteRule, RewriteRules};
pub use runner::{ResolvedCommand, Runner, RunnerResolver};
pub use supervisor::{
    Aggregate, DEFAULT_PROBE_TIMEOUT, DEFAULT_WEB_SEARCH_SERVERS, McpSupervisor, ServerFailure,
    SkipReason, SkippedServer, SupervisorOptions,
};
pub use transport::StdioTransport;
