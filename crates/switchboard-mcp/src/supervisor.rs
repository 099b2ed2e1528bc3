//! Server connection supervisor.
//!
//! The [`McpSupervisor`] owns every live connection. Each call to
//! [`McpSupervisor::connect_all`] is one aggregation run: it connects (or
//! reuses) every configured server concurrently and returns a fresh
//! [`ToolRegistry`] describing the merged tool namespace.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_mcp::{McpServerConfig, McpSupervisor, SupervisorOptions};
//!
//! let supervisor = McpSupervisor::new(SupervisorOptions::default());
//! let configs = vec![
//!     McpServerConfig::new("filesystem", "npx")
//!         .with_args(vec!["-y".into(), "@modelcontextprotocol/server-filesystem".into()])
//!         .with_arg("{ALLOWED_DIRECTORIES}")
//!         .with_env_var("ALLOWED_DIRECTORIES", "/home/me/notes"),
//! ];
//!
//! let aggregate = supervisor.connect_all(&configs, false).await;
//! println!("{} tools from {} servers", aggregate.registry.len(), aggregate.connected.len());
//!
//! supervisor.shutdown_all().await;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;

use crate::client::{DEFAULT_REQUEST_TIMEOUT, McpClient, McpServerConfig};
use crate::connection::{ConnectionSet, SharedConnection, ToolConnection};
use crate::environment::{EnvOverride, child_env};
use crate::error::{FailureHint, McpError};
use crate::protocol::ToolInfo;
use crate::registry::ToolRegistry;
use crate::rewrite::RewriteRules;
use crate::runner::RunnerResolver;

/// Default bound for the liveness probe on a reused connection.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server keys skipped when web search is off, unless configured otherwise.
pub const DEFAULT_WEB_SEARCH_SERVERS: &[&str] = &["brave-search"];

/// Knobs for aggregation runs.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Locates runner executables.
    pub resolver: RunnerResolver,
    /// Argument rewrites applied before launch.
    pub rewrite_rules: RewriteRules,
    /// Servers that only take part when web search is enabled.
    pub web_search_servers: Vec<String>,
    /// Bound for the handshake and for tool listing.
    pub request_timeout: Duration,
    /// Bound for the liveness probe on reuse.
    pub probe_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            resolver: RunnerResolver::default(),
            rewrite_rules: RewriteRules::builtin(),
            web_search_servers: DEFAULT_WEB_SEARCH_SERVERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Why a configured server took no part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A web-search server while the toggle is off.
    WebSearchDisabled,
    /// Another entry earlier in the list already uses this key.
    DuplicateKey,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebSearchDisabled => f.write_str("web search disabled"),
            Self::DuplicateKey => f.write_str("duplicate key"),
        }
    }
}

/// A server skipped in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedServer {
    /// Server key.
    pub key: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A server that failed to come up in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    /// Server key.
    pub key: String,
    /// Program that was launched.
    pub command: String,
    /// Arguments after rewriting.
    pub args: Vec<String>,
    /// Error text.
    pub error: String,
    /// Categorized hint.
    pub hint: FailureHint,
}

/// Result of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    /// Merged tool namespace, in configuration order.
    pub registry: ToolRegistry,
    /// Keys that contributed tools, reused ones included.
    pub connected: Vec<String>,
    /// Keys whose existing connection passed the liveness probe.
    pub reused: Vec<String>,
    /// Servers skipped before launch.
    pub skipped: Vec<SkippedServer>,
    /// Servers that failed.
    pub failures: Vec<ServerFailure>,
}

/// What a connection was launched with. A connection is only reused while
/// its server's configuration still produces the same launch.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LaunchSpec {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<EnvOverride>,
}

enum ServerOutcome {
    Ready {
        key: String,
        tools: Vec<ToolInfo>,
        reused: bool,
    },
    Failed(ServerFailure),
}

/// Owns the live connections to every tool server.
pub struct McpSupervisor {
    connections: ConnectionSet,
    /// Launch specs of connections this supervisor started, by key.
    launched: RwLock<HashMap<String, LaunchSpec>>,
    options: SupervisorOptions,
}

impl McpSupervisor {
    /// Create a supervisor with no connections.
    pub fn new(options: SupervisorOptions) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            launched: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Options used for runs.
    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// Shared handle to the live connections.
    pub fn connections(&self) -> ConnectionSet {
        self.connections.clone()
    }

    /// A live connection by key.
    pub fn connection(&self, key: &str) -> Option<SharedConnection> {
        self.connections.read().get(key).cloned()
    }

    /// Keys of all held connections, sorted.
    pub fn connected_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.connections.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of held connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Adopt an already-initialized connection, replacing any with the same key.
    ///
    /// Adopted connections are reused for any configuration of their key.
    pub fn insert_connection(&self, conn: SharedConnection) -> Option<SharedConnection> {
        let key = conn.key().to_string();
        self.launched.write().remove(&key);
        self.connections.write().insert(key, conn)
    }

    fn insert_launched(&self, conn: SharedConnection, spec: LaunchSpec) {
        let key = conn.key().to_string();
        self.launched.write().insert(key.clone(), spec);
        self.connections.write().insert(key, conn);
    }

    /// Run one aggregation over `configs`.
    ///
    /// Never fails: per-server problems are logged and reported in
    /// [`Aggregate::failures`]. Zero connected servers is a valid outcome.
    pub async fn connect_all(&self, configs: &[McpServerConfig], web_search: bool) -> Aggregate {
        let mut aggregate = Aggregate::default();

        let mut seen = HashSet::new();
        let mut active = Vec::new();
        for config in configs {
            if !seen.insert(config.key.as_str()) {
                tracing::error!(
                    server = %config.key,
                    label = %config.label,
                    "duplicate server key in configuration; skipping entry"
                );
                aggregate.skipped.push(SkippedServer {
                    key: config.key.clone(),
                    reason: SkipReason::DuplicateKey,
                });
                continue;
            }
            if !web_search && self.options.web_search_servers.contains(&config.key) {
                tracing::info!(server = %config.key, "web search disabled; skipping server");
                aggregate.skipped.push(SkippedServer {
                    key: config.key.clone(),
                    reason: SkipReason::WebSearchDisabled,
                });
                continue;
            }
            active.push(config);
        }

        self.prune(&seen).await;

        let outcomes = join_all(active.into_iter().map(|config| self.connect_server(config))).await;

        for outcome in outcomes {
            match outcome {
                ServerOutcome::Ready { key, tools, reused } => {
                    aggregate.registry.register(&key, tools);
                    if reused {
                        aggregate.reused.push(key.clone());
                    }
                    aggregate.connected.push(key);
                }
                ServerOutcome::Failed(failure) => aggregate.failures.push(failure),
            }
        }

        tracing::info!(
            configured = configs.len(),
            connected = aggregate.connected.len(),
            reused = aggregate.reused.len(),
            skipped = aggregate.skipped.len(),
            failed = aggregate.failures.len(),
            tools = aggregate.registry.len(),
            "MCP aggregation complete"
        );

        aggregate
    }

    /// Shut down connections whose key is no longer configured.
    async fn prune(&self, configured: &HashSet<&str>) {
        let stale: Vec<SharedConnection> = {
            let mut connections = self.connections.write();
            let keys: Vec<String> = connections
                .keys()
                .filter(|k| !configured.contains(k.as_str()))
                .cloned()
                .collect();
            let mut launched = self.launched.write();
            for key in &keys {
                launched.remove(key);
            }
            keys.iter().filter_map(|k| connections.remove(k)).collect()
        };

        for conn in stale {
            tracing::info!(server = %conn.key(), "server no longer configured; disconnecting");
            if let Err(e) = conn.shutdown().await {
                tracing::debug!(server = %conn.key(), error = %e, "error during shutdown");
            }
        }
    }

    /// Remove `conn` from the set if it is still the registered connection for its key.
    fn remove_if_current(&self, conn: &SharedConnection) {
        let mut connections = self.connections.write();
        if connections
            .get(conn.key())
            .is_some_and(|current| Arc::ptr_eq(current, conn))
        {
            connections.remove(conn.key());
            self.launched.write().remove(conn.key());
        }
    }

    async fn connect_server(&self, config: &McpServerConfig) -> ServerOutcome {
        let key = config.key.as_str();

        let args = self
            .options
            .rewrite_rules
            .apply(key, &config.args, &config.env);
        let resolved = self.options.resolver.resolve(&config.command);
        let spec = LaunchSpec {
            program: resolved.program().to_path_buf(),
            args: args.clone(),
            env: config.env.clone(),
        };

        if let Some(existing) = self.connection(key) {
            let changed = self
                .launched
                .read()
                .get(key)
                .is_some_and(|previous| *previous != spec);

            if changed {
                tracing::info!(server = %key, "server configuration changed; relaunching");
                self.remove_if_current(&existing);
                if let Err(e) = existing.shutdown().await {
                    tracing::debug!(server = %key, error = %e, "error closing outdated connection");
                }
            } else {
                match existing.list_tools(self.options.probe_timeout).await {
                    Ok(tools) => {
                        tracing::debug!(server = %key, tool_count = tools.len(), "reusing MCP connection");
                        return ServerOutcome::Ready {
                            key: key.to_string(),
                            tools,
                            reused: true,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(server = %key, error = %e, "liveness probe failed; relaunching");
                        self.remove_if_current(&existing);
                        if let Err(e) = existing.shutdown().await {
                            tracing::debug!(server = %key, error = %e, "error closing stale connection");
                        }
                    }
                }
            }
        }

        let env = child_env(&config.env);

        let fail = |error: McpError| {
            let hint = error.hint();
            tracing::error!(
                server = %key,
                command = %resolved,
                args = ?args,
                hint = %hint,
                error = %error,
                "failed to connect MCP server: {}",
                hint.describe()
            );
            ServerOutcome::Failed(ServerFailure {
                key: key.to_string(),
                command: resolved.to_string(),
                args: args.clone(),
                error: error.to_string(),
                hint,
            })
        };

        let mut client = match McpClient::launch(
            key,
            resolved.program(),
            &args,
            &env,
            self.options.request_timeout,
        ) {
            Ok(client) => client,
            Err(e) => return fail(e),
        };

        if let Err(e) = client.initialize().await {
            if let Err(close_err) = client.shutdown().await {
                tracing::debug!(server = %key, error = %close_err, "error during shutdown");
            }
            return fail(e);
        }

        let conn: SharedConnection = Arc::new(client);
        self.insert_launched(conn.clone(), spec);
        tracing::info!(server = %key, label = %config.label, "MCP server connected; listing tools");

        match conn.list_tools(self.options.request_timeout).await {
            Ok(tools) => {
                tracing::info!(
                    server = %key,
                    tools = %tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "),
                    "MCP server ready"
                );
                ServerOutcome::Ready {
                    key: key.to_string(),
                    tools,
                    reused: false,
                }
            }
            Err(e) => {
                self.remove_if_current(&conn);
                if let Err(close_err) = conn.shutdown().await {
                    tracing::debug!(server = %key, error = %close_err, "error during shutdown");
                }
                fail(e)
            }
        }
    }

    /// Shut down every connection.
    pub async fn shutdown_all(&self) {
        let all: Vec<SharedConnection> = self.connections.write().drain().map(|(_, c)| c).collect();
        self.launched.write().clear();
        tracing::info!(server_count = all.len(), "shutting down all MCP servers");

        join_all(all.iter().map(|conn| async move {
            if let Err(e) = conn.shutdown().await {
                tracing::debug!(server = %conn.key(), error = %e, "error during shutdown");
            }
        }))
        .await;
    }
}

impl Drop for McpSupervisor {
    fn drop(&mut self) {
        // Children are killed when their transports drop.
        let count = self.connections.read().len();
        if count > 0 {
            tracing::debug!(count, "dropping McpSupervisor, disconnecting servers");
        }
    }
}

impl std::fmt::Debug for McpSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSupervisor")
            .field("connected", &self.connected_keys())
            .field("options", &self.options)
            .finish()
    }
}
