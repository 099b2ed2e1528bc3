//! Merged tool namespace across all connected servers.

use std::collections::HashMap;

use crate::protocol::ToolInfo;

/// A tool together with the server that serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTool {
    /// Key of the owning server.
    pub server_key: String,
    /// The server's tool descriptor.
    pub info: ToolInfo,
}

/// A tool name exposed by more than one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCollision {
    /// Tool name.
    pub tool: String,
    /// Server that now owns the name.
    pub winner: String,
    /// Server whose registration was overwritten.
    pub loser: String,
}

/// Routing table from tool name to server key.
///
/// The last registration of a name wins; each overwrite is recorded as a
/// [`ToolCollision`] and logged.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    routes: HashMap<String, String>,
    tools: Vec<RegisteredTool>,
    collisions: Vec<ToolCollision>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool of one server.
    pub fn register(&mut self, server_key: &str, tools: Vec<ToolInfo>) {
        for info in tools {
            self.register_tool(server_key, info);
        }
    }

    fn register_tool(&mut self, server_key: &str, info: ToolInfo) {
        let name = info.name.clone();
        let entry = RegisteredTool {
            server_key: server_key.to_string(),
            info,
        };

        match self.routes.insert(name.clone(), server_key.to_string()) {
            Some(previous) => {
                if previous != server_key {
                    tracing::warn!(
                        tool = %name,
                        winner = %server_key,
                        loser = %previous,
                        "tool name registered by multiple servers; later registration wins"
                    );
                    self.collisions.push(ToolCollision {
                        tool: name.clone(),
                        winner: server_key.to_string(),
                        loser: previous,
                    });
                }
                if let Some(slot) = self.tools.iter_mut().find(|t| t.info.name == name) {
                    *slot = entry;
                }
            }
            None => self.tools.push(entry),
        }
    }

    /// Key of the server that owns `tool_name`.
    pub fn resolve(&self, tool_name: &str) -> Option<&str> {
        self.routes.get(tool_name).map(String::as_str)
    }

    /// Merged tool list, one entry per unique name in first-seen order.
    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    /// Tools owned by one server.
    pub fn tools_for<'a>(&'a self, server_key: &'a str) -> impl Iterator<Item = &'a ToolInfo> + 'a {
        self.tools
            .iter()
            .filter(move |t| t.server_key == server_key)
            .map(|t| &t.info)
    }

    /// Recorded name collisions.
    pub fn collisions(&self) -> &[ToolCollision] {
        &self.collisions
    }

    /// Number of routed tool names.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no tools are routed.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
