//! Settings types mapping to the TOML schema.
//!
//! ```toml
//! [mcp]            # server list location, runner lookup, timeouts
//! [[mcp.rewrite]]  # extra argument rewrite rules
//! [dispatch]       # tool-call retries and timeout
//! [agent]          # conversation loop
//! [model]          # model backend
//! [logging]        # diagnostic log directory
//! [interactions]   # chat interaction log
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Placeholder argument replaced by the entries of an env variable.
pub const DEFAULT_REWRITE_PLACEHOLDER: &str = "{ALLOWED_DIRECTORIES}";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Root settings structure.
///
/// All sections are optional so that partial files (e.g. a project-local
/// override) can be loaded and layered. Use the accessors to read a section
/// with defaults applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mcp: Option<McpSettings>,
    pub dispatch: Option<DispatchSettings>,
    pub agent: Option<AgentSettings>,
    pub model: Option<ModelSettings>,
    pub logging: Option<LoggingSettings>,
    pub interactions: Option<InteractionSettings>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Layer `other` on top of this one. Sections present in `other`
    /// replace the whole section.
    pub fn merge(&mut self, other: Settings) {
        if other.mcp.is_some() {
            self.mcp = other.mcp;
        }
        if other.dispatch.is_some() {
            self.dispatch = other.dispatch;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
        if other.interactions.is_some() {
            self.interactions = other.interactions;
        }
    }

    pub fn mcp(&self) -> McpSettings {
        self.mcp.clone().unwrap_or_default()
    }

    pub fn dispatch(&self) -> DispatchSettings {
        self.dispatch.clone().unwrap_or_default()
    }

    pub fn agent(&self) -> AgentSettings {
        self.agent.clone().unwrap_or_default()
    }

    pub fn model(&self) -> ModelSettings {
        self.model.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingSettings {
        self.logging.clone().unwrap_or_default()
    }

    pub fn interactions(&self) -> InteractionSettings {
        self.interactions.clone().unwrap_or_default()
    }

    /// Every section filled in with its effective values.
    pub fn resolved(&self) -> Settings {
        Settings {
            mcp: Some(self.mcp()),
            dispatch: Some(self.dispatch()),
            agent: Some(self.agent()),
            model: Some(self.model()),
            logging: Some(self.logging()),
            interactions: Some(self.interactions()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [mcp]
// ─────────────────────────────────────────────────────────────────────────────

/// Tool-server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Server-list JSON document. Defaults to `<config dir>/servers.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_file: Option<PathBuf>,

    /// Directory searched for `npx`/`uvx` before the search path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundled_bin_dir: Option<PathBuf>,

    /// Servers that only run when web search is on.
    pub web_search_servers: Vec<String>,

    /// Handshake and tool-listing timeout.
    pub request_timeout_secs: u64,

    /// Liveness probe timeout for reused connections.
    pub probe_timeout_secs: u64,

    /// Extra argument rewrite rules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rewrite: Vec<RewriteSettings>,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            servers_file: None,
            bundled_bin_dir: None,
            web_search_servers: vec!["brave-search".to_string()],
            request_timeout_secs: 60,
            probe_timeout_secs: 10,
            rewrite: Vec::new(),
        }
    }
}

impl McpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// One `[[mcp.rewrite]]` entry.
///
/// For server `server`, an argument equal to `placeholder` is replaced by the
/// path-list entries of the server's `env` variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteSettings {
    pub server: String,
    pub env: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

fn default_placeholder() -> String {
    DEFAULT_REWRITE_PLACEHOLDER.to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// [dispatch]
// ─────────────────────────────────────────────────────────────────────────────

/// Tool-call retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub call_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            call_timeout_secs: 120,
        }
    }
}

impl DispatchSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [agent]
// ─────────────────────────────────────────────────────────────────────────────

/// Conversation loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Cap on model round-trips per chat.
    pub max_iterations: u32,

    /// Overrides the built-in system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_instruction: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [model]
// ─────────────────────────────────────────────────────────────────────────────

/// Model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "gemini-1.5-flash".to_string(),
            base_url: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            max_retries: 2,
            retry_delay_ms: 1500,
            timeout_secs: 120,
        }
    }
}

impl ModelSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// [logging] / [interactions]
// ─────────────────────────────────────────────────────────────────────────────

/// Diagnostic log settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for the rolling JSON log. Defaults to `<config dir>/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Chat interaction log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    pub enabled: bool,

    /// Directory for JSONL files. Defaults to `<config dir>/interactions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub retention_days: u32,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            retention_days: 90,
        }
    }
}
