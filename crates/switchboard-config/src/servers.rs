//! The server-list JSON document.
//!
//! ```json
//! {
//!   "leftList": [
//!     {
//!       "label": "Filesystem",
//!       "key": "filesystem",
//!       "config": {
//!         "command": "npx",
//!         "args": ["-y", "@modelcontextprotocol/server-filesystem", "{ALLOWED_DIRECTORIES}"],
//!         "env": { "ALLOWED_DIRECTORIES": "/home/me/notes", "DEBUG": null }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Entries that cannot be used are reported in [`ServerList::skipped`]
//! instead of failing the whole document. Other top-level keys are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConfigError, Result};

/// Runner used when an entry names no command.
pub const DEFAULT_COMMAND: &str = "npx";

/// One configured tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub label: String,
    pub key: String,
    pub config: EntryConfig,
}

/// Launch settings of a server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Overrides of the process environment; `None` removes the variable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, Option<String>>,
}

impl ServerEntry {
    pub fn new(key: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            config: EntryConfig {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.config.env.insert(name.into(), value);
        self
    }
}

/// Why an entry of the document was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySkipReason {
    MissingKey,
    MissingConfig,
    MissingArgs,
    /// The entry has the wrong shape.
    Invalid(String),
}

impl fmt::Display for EntrySkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey => f.write_str("missing 'key'"),
            Self::MissingConfig => f.write_str("missing 'config'"),
            Self::MissingArgs => f.write_str("missing 'config.args'"),
            Self::Invalid(msg) => write!(f, "invalid entry: {}", msg),
        }
    }
}

/// An entry that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Position in `leftList`.
    pub index: usize,
    pub key: Option<String>,
    pub reason: EntrySkipReason,
}

/// Parsed server list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerList {
    pub servers: Vec<ServerEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Serializable document shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerListDocument {
    pub left_list: Vec<ServerEntry>,
}

impl ServerListDocument {
    pub fn new(servers: Vec<ServerEntry>) -> Self {
        Self { left_list: servers }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    config: Option<RawConfig>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<BTreeMap<String, Option<String>>>,
}

/// Parse a server-list document.
///
/// Fails only when the text is not JSON or `leftList` is not an array.
pub fn parse_server_list(json: &str) -> Result<ServerList> {
    let doc: Value = serde_json::from_str(json)?;
    let entries = match doc.get("leftList") {
        None | Some(Value::Null) => return Ok(ServerList::default()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ConfigError::ServerList(
                "'leftList' must be an array".to_string(),
            ));
        }
    };

    let mut list = ServerList::default();
    for (index, value) in entries.iter().enumerate() {
        let declared_key = value
            .get("key")
            .and_then(Value::as_str)
            .map(String::from);
        match parse_entry(value) {
            Ok(entry) => list.servers.push(entry),
            Err(reason) => list.skipped.push(SkippedEntry {
                index,
                key: declared_key,
                reason,
            }),
        }
    }

    Ok(list)
}

fn parse_entry(value: &Value) -> std::result::Result<ServerEntry, EntrySkipReason> {
    let raw: RawEntry = serde_json::from_value(value.clone())
        .map_err(|e| EntrySkipReason::Invalid(e.to_string()))?;

    let key = raw
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or(EntrySkipReason::MissingKey)?;
    let config = raw.config.ok_or(EntrySkipReason::MissingConfig)?;
    let args = config.args.ok_or(EntrySkipReason::MissingArgs)?;
    let command = config
        .command
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COMMAND.to_string());

    Ok(ServerEntry {
        label: raw.label.unwrap_or_else(|| key.clone()),
        key,
        config: EntryConfig {
            command,
            args,
            env: config.env.unwrap_or_default(),
        },
    })
}

/// Load a server-list document. A missing file is an empty list.
pub fn load_server_list(path: &Path) -> Result<ServerList> {
    if !path.exists() {
        return Ok(ServerList::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_server_list(&contents)
}

/// Write a server-list document, creating parent directories.
pub fn save_server_list(servers: &[ServerEntry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    let contents = ServerListDocument::new(servers.to_vec()).to_json_pretty()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}
