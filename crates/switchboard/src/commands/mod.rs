//! CLI command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use switchboard_agent::{ChatService, LoopConfig};
use switchboard_config::{LoadedSettings, ServerEntry, load_server_list};
use switchboard_llm::{
    GeminiBackend, GeminiConfig, InteractionLogConfig, InteractionLogger, SharedModel,
};
use switchboard_mcp::{
    DispatchConfig, McpServerConfig, McpSupervisor, RewriteRule, RewriteRules, RunnerResolver,
    SupervisorOptions,
};

pub mod ask;
pub mod chat;
pub mod config;
pub mod repl;
pub mod servers;
pub mod tools;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Discovered settings.
    pub loaded: LoadedSettings,
    /// Server-list document given on the command line.
    pub servers_file: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Server-list document in effect.
    pub fn servers_path(&self) -> PathBuf {
        self.servers_file
            .clone()
            .unwrap_or_else(|| self.loaded.servers_file())
    }

    /// Load the server list, logging entries that were skipped.
    pub fn server_configs(&self) -> Result<Vec<McpServerConfig>> {
        let path = self.servers_path();
        let list = load_server_list(&path)
            .with_context(|| format!("loading server list {}", path.display()))?;

        for skipped in &list.skipped {
            tracing::warn!(
                index = skipped.index,
                key = ?skipped.key,
                reason = %skipped.reason,
                "Skipping server-list entry"
            );
        }

        Ok(list.servers.iter().map(to_server_config).collect())
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        let mcp = self.loaded.settings.mcp();
        let rewrite_rules = mcp.rewrite.iter().fold(RewriteRules::builtin(), |rules, r| {
            rules.with_rule(RewriteRule::new(&r.server, &r.placeholder, &r.env))
        });

        SupervisorOptions {
            resolver: RunnerResolver::new(mcp.bundled_bin_dir.clone()),
            rewrite_rules,
            web_search_servers: mcp.web_search_servers.clone(),
            request_timeout: mcp.request_timeout(),
            probe_timeout: mcp.probe_timeout(),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let dispatch = self.loaded.settings.dispatch();
        DispatchConfig {
            max_retries: dispatch.max_retries,
            retry_delay: dispatch.retry_delay(),
            call_timeout: dispatch.call_timeout(),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        let agent = self.loaded.settings.agent();
        let mut config = LoopConfig {
            max_iterations: agent.max_iterations,
            ..LoopConfig::default()
        };
        if agent.system_instruction.is_some() {
            config.system_instruction = agent.system_instruction;
        }
        config
    }

    /// Build the model backend from `[model]` settings.
    pub fn model(&self) -> Result<SharedModel> {
        let settings = self.loaded.settings.model();
        let mut config = GeminiConfig::from_env(&settings.api_key_env)?
            .with_model(&settings.name)
            .with_timeout(settings.timeout())
            .with_max_retries(settings.max_retries)
            .with_retry_delay(settings.retry_delay());
        if let Some(url) = &settings.base_url {
            config = config.with_base_url(url);
        }
        Ok(Arc::new(GeminiBackend::new(config)?))
    }

    /// Interaction logger for `[interactions]`. Falls back to disabled on error.
    pub fn interaction_logger(&self) -> InteractionLogger {
        let settings = self.loaded.settings.interactions();
        let config = InteractionLogConfig {
            enabled: settings.enabled,
            path: Some(self.loaded.interactions_dir()),
            retention_days: settings.retention_days,
        };
        match InteractionLogger::new(config) {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open chat log; chat logging disabled");
                InteractionLogger::disabled()
            }
        }
    }

    /// Everything a chat needs, wired from settings.
    pub fn chat_service(&self) -> Result<ChatService> {
        let supervisor = Arc::new(McpSupervisor::new(self.supervisor_options()));
        Ok(ChatService::new(supervisor, self.model()?)
            .with_servers(self.server_configs()?)
            .with_loop_config(self.loop_config())
            .with_dispatch_config(self.dispatch_config())
            .with_interaction_logger(self.interaction_logger()))
    }
}

/// Map a server-list entry to a launch configuration.
pub fn to_server_config(entry: &ServerEntry) -> McpServerConfig {
    entry.config.env.iter().fold(
        McpServerConfig::new(&entry.key, &entry.config.command)
            .with_label(&entry.label)
            .with_args(entry.config.args.clone()),
        |config, (name, value)| match value {
            Some(value) => config.with_env_var(name, value),
            None => config.without_env_var(name),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::{Settings, load_settings_with_options};

    fn context(dir: &std::path::Path, toml: &str) -> Context {
        std::fs::write(dir.join("config.toml"), toml).unwrap();
        let loaded = load_settings_with_options(Some(dir), Some(dir)).unwrap();
        Context {
            loaded,
            servers_file: None,
            json_output: false,
            verbose: false,
        }
    }

    #[test]
    fn test_to_server_config() {
        let entry = ServerEntry::new("fs", "npx", vec!["-y".to_string(), "pkg".to_string()])
            .with_label("Files")
            .with_env("ALLOWED_DIRECTORIES", Some("/tmp".to_string()))
            .with_env("DEBUG", None);

        let config = to_server_config(&entry);
        assert_eq!(config.key, "fs");
        assert_eq!(config.label, "Files");
        assert_eq!(config.command, "npx");
        assert_eq!(config.args, vec!["-y", "pkg"]);
        assert!(config.env.contains(&(
            "ALLOWED_DIRECTORIES".to_string(),
            Some("/tmp".to_string())
        )));
        assert!(config.env.contains(&("DEBUG".to_string(), None)));
    }

    #[test]
    fn test_settings_flow_into_options() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            dir.path(),
            r#"
[mcp]
web_search_servers = ["brave-search", "tavily"]
probe_timeout_secs = 3

[[mcp.rewrite]]
server = "notes"
env = "NOTES_DIRS"

[dispatch]
max_retries = 1
retry_delay_ms = 10

[agent]
max_iterations = 4
"#,
        );

        let options = ctx.supervisor_options();
        assert_eq!(options.web_search_servers, vec!["brave-search", "tavily"]);
        assert_eq!(options.probe_timeout, std::time::Duration::from_secs(3));
        assert_eq!(options.rewrite_rules.rules().len(), 2);
        assert_eq!(options.rewrite_rules.rules()[1].server, "notes");
        assert_eq!(options.rewrite_rules.rules()[1].placeholder, "{ALLOWED_DIRECTORIES}");

        let dispatch = ctx.dispatch_config();
        assert_eq!(dispatch.max_retries, 1);
        assert_eq!(dispatch.retry_delay, std::time::Duration::from_millis(10));

        let loop_config = ctx.loop_config();
        assert_eq!(loop_config.max_iterations, 4);
        assert!(loop_config.system_instruction.is_some());
    }

    #[test]
    fn test_servers_path_prefers_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), "");
        assert_eq!(ctx.servers_path(), dir.path().join("servers.json"));
        assert_eq!(ctx.loaded.settings, Settings::default());

        ctx.servers_file = Some(dir.path().join("other.json"));
        assert_eq!(ctx.servers_path(), dir.path().join("other.json"));
        assert!(ctx.server_configs().unwrap().is_empty());
    }
}
