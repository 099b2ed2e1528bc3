//! Settings file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `<config dir>/config.toml`
//! 2. `./switchboard.toml` (project-local)
//! 3. CLI arguments (handled externally)
//!
//! The config dir is the explicit override, else `SWITCHBOARD_CONFIG_DIR`,
//! else the platform config dir joined with `switchboard`.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, Settings};

/// Project-local settings filename.
const PROJECT_CONFIG_FILE: &str = "switchboard.toml";

/// Settings filename within the config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Default server-list filename within the config directory.
const SERVERS_FILE: &str = "servers.json";

const APP_NAME: &str = "switchboard";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SWITCHBOARD_CONFIG_DIR";

/// Where one settings layer was looked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of settings discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    /// The merged settings.
    pub settings: Settings,
    /// Sources checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// The config directory in effect.
    pub config_dir: PathBuf,
    /// Problems found while loading (e.g. an unparsable layer).
    pub warnings: Vec<String>,
}

impl LoadedSettings {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }

    /// Server-list document location.
    pub fn servers_file(&self) -> PathBuf {
        self.settings
            .mcp()
            .servers_file
            .unwrap_or_else(|| self.config_dir.join(SERVERS_FILE))
    }

    /// Diagnostic log directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.settings
            .logging()
            .dir
            .unwrap_or_else(|| self.config_dir.join("logs"))
    }

    /// Chat interaction log directory.
    pub fn interactions_dir(&self) -> PathBuf {
        self.settings
            .interactions()
            .path
            .unwrap_or_else(|| self.config_dir.join("interactions"))
    }

    /// Path of the user-level settings file.
    pub fn user_config_path(&self) -> PathBuf {
        self.config_dir.join(USER_CONFIG_FILE)
    }
}

/// Discover and merge all settings layers.
pub fn load_settings(project_dir: Option<&Path>) -> Result<LoadedSettings> {
    load_settings_with_options(project_dir, None)
}

/// Discover and merge settings with an explicit config directory.
///
/// `config_dir` overrides both `SWITCHBOARD_CONFIG_DIR` and the platform
/// default.
pub fn load_settings_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedSettings> {
    let config_dir = config_dir
        .map(Path::to_path_buf)
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut settings = Settings::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_path = config_dir.join(USER_CONFIG_FILE);
    sources.push(load_layer(&mut settings, &user_path, &mut warnings));

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut settings, &project_path, &mut warnings));

    Ok(LoadedSettings {
        settings,
        sources,
        config_dir,
        warnings,
    })
}

/// Load settings from a specific file (no discovery).
pub fn load_settings_file(path: &Path) -> Result<Settings> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Settings::from_toml(&contents)
}

/// Save settings to a file, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = settings.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// The config directory from `SWITCHBOARD_CONFIG_DIR` or the platform default.
pub fn default_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

fn load_layer(settings: &mut Settings, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_settings_file(path) {
        Ok(layer) => {
            settings.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}
