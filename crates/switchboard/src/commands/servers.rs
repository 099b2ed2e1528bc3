//! Servers command - inspect configured MCP servers and the preset catalogue.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use switchboard_config::presets_document;
use switchboard_mcp::{Aggregate, McpSupervisor};

use super::Context;

/// Arguments for the servers command.
#[derive(Args, Debug)]
pub struct ServersArgs {
    #[command(subcommand)]
    pub command: ServersCommand,
}

#[derive(Subcommand, Debug)]
pub enum ServersCommand {
    /// Connect every configured server and list its tools
    List {
        /// Include web-search servers
        #[arg(long)]
        web_search: bool,
    },

    /// Print presets as a server-list document
    Presets {
        /// Preset keys (all when omitted)
        keys: Vec<String>,
    },
}

/// Run the servers command.
pub async fn run(args: ServersArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ServersCommand::List { web_search } => cmd_list(ctx, web_search).await,
        ServersCommand::Presets { keys } => cmd_presets(&keys),
    }
}

async fn cmd_list(ctx: &Context, web_search: bool) -> Result<()> {
    let configs = ctx.server_configs()?;
    let supervisor = McpSupervisor::new(ctx.supervisor_options());

    let aggregate = supervisor.connect_all(&configs, web_search).await;
    supervisor.shutdown_all().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&aggregate_json(&aggregate))?);
        return Ok(());
    }

    if configs.is_empty() {
        println!("No servers configured in {}", ctx.servers_path().display());
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    let red = Style::new().red();

    for key in &aggregate.connected {
        println!("{} {}", green.apply_to("●"), style(key).bold());
        for tool in aggregate.registry.tools_for(key) {
            let description = tool.description.as_deref().unwrap_or("");
            println!("    {}  {}", style(&tool.name).cyan(), dim.apply_to(description));
        }
    }

    for skipped in &aggregate.skipped {
        println!(
            "{} {} {}",
            dim.apply_to("○"),
            skipped.key,
            dim.apply_to(format!("(skipped: {})", skipped.reason))
        );
    }

    for failure in &aggregate.failures {
        println!("{} {}", red.apply_to("●"), style(&failure.key).bold());
        println!("    {}", red.apply_to(&failure.error));
        println!("    {}", dim.apply_to(failure.hint.describe()));
    }

    for collision in aggregate.registry.collisions() {
        println!(
            "{}",
            dim.apply_to(format!(
                "Tool '{}' from {} replaced the one from {}",
                collision.tool, collision.winner, collision.loser
            ))
        );
    }

    Ok(())
}

fn aggregate_json(aggregate: &Aggregate) -> serde_json::Value {
    let connected: Vec<serde_json::Value> = aggregate
        .connected
        .iter()
        .map(|key| {
            let tools: Vec<&str> = aggregate
                .registry
                .tools_for(key)
                .map(|t| t.name.as_str())
                .collect();
            serde_json::json!({
                "key": key,
                "reused": aggregate.reused.contains(key),
                "tools": tools,
            })
        })
        .collect();

    let skipped: Vec<serde_json::Value> = aggregate
        .skipped
        .iter()
        .map(|s| serde_json::json!({ "key": s.key, "reason": s.reason.to_string() }))
        .collect();

    let failures: Vec<serde_json::Value> = aggregate
        .failures
        .iter()
        .map(|f| {
            serde_json::json!({
                "key": f.key,
                "command": f.command,
                "args": f.args,
                "error": f.error,
                "hint": f.hint.describe(),
            })
        })
        .collect();

    serde_json::json!({
        "connected": connected,
        "skipped": skipped,
        "failures": failures,
    })
}

fn cmd_presets(keys: &[String]) -> Result<()> {
    let document = presets_document(keys)?;
    println!("{}", document.to_json_pretty()?);
    Ok(())
}
