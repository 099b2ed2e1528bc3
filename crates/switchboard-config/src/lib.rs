//! Configuration system for Switchboard.
//!
//! Provides:
//! - TOML settings with layering (user config dir + project-local `switchboard.toml`)
//! - The server-list JSON document (`leftList` of `{label, key, config}` entries)
//! - A catalogue of well-known MCP server presets

pub mod discovery;
pub mod error;
pub mod presets;
pub mod servers;
pub mod settings;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedSettings, default_config_dir, load_settings,
    load_settings_file, load_settings_with_options, save_settings,
};
pub use error::{ConfigError, Result};
pub use presets::{Preset, preset, presets, presets_document};
pub use servers::{
    DEFAULT_COMMAND, EntryConfig, EntrySkipReason, ServerEntry, ServerList, ServerListDocument,
    SkippedEntry, load_server_list, parse_server_list, save_server_list,
};
pub use settings::*;
