//! Switchboard - MCP tool routing chat client
//!
//! Main entry point for the Switchboard CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ask, chat, config, servers, tools};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Switchboard - chat with a model that can call your MCP servers' tools
#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration directory
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Server-list document (overrides `mcp.servers_file`)
    #[arg(long, global = true)]
    pub servers: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Inspect configured MCP servers and presets
    Servers(servers::ServersArgs),

    /// Call a tool directly
    Tools(tools::ToolsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = switchboard_config::load_settings_with_options(None, cli.config_dir.as_deref())?;

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "switchboard=debug,switchboard_agent=debug,switchboard_llm=debug,switchboard_mcp=debug,switchboard_config=debug,info"
    } else {
        "switchboard=info,switchboard_agent=info,switchboard_llm=info,switchboard_mcp=info,warn"
    };

    let file_appender = tracing_appender::rolling::daily(loaded.logs_dir(), "switchboard.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "switchboard=trace,switchboard_agent=trace,switchboard_llm=trace,switchboard_mcp=trace,switchboard_config=trace,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        servers_file: cli.servers,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Servers(args) => servers::run(args, &ctx).await,
        Commands::Tools(args) => tools::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
