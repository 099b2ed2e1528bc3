//! Tools command - call one tool through the router.

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clap::{Args, Subcommand};
use console::Style;

use switchboard_mcp::{Dispatcher, McpSupervisor, ToolCall, ToolInvoker};

use super::Context;

/// Arguments for the tools command.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    #[command(subcommand)]
    pub command: ToolsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommand {
    /// Connect servers and invoke one tool
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Include web-search servers
        #[arg(long)]
        web_search: bool,
    },
}

/// Run the tools command.
pub async fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ToolsCommand::Call {
            name,
            args,
            web_search,
        } => cmd_call(ctx, name, args.as_deref(), web_search).await,
    }
}

fn parse_arguments(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--args must be valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object");
    }
    Ok(Some(value))
}

async fn cmd_call(ctx: &Context, name: String, raw: Option<&str>, web_search: bool) -> Result<()> {
    let arguments = parse_arguments(raw)?;
    let configs = ctx.server_configs()?;
    let supervisor = McpSupervisor::new(ctx.supervisor_options());

    let aggregate = supervisor.connect_all(&configs, web_search).await;
    let dispatcher = Dispatcher::new(Arc::new(aggregate.registry), supervisor.connections())
        .with_config(ctx.dispatch_config());
    let payload = dispatcher.invoke(ToolCall::new(name, arguments)).await;
    supervisor.shutdown_all().await;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if payload.is_error {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), payload.content);
    } else {
        if ctx.verbose {
            let dim = Style::new().dim();
            println!(
                "{}",
                dim.apply_to(format!(
                    "[{} via {}, {} attempt(s)]",
                    payload.tool_name,
                    payload.server_key.as_deref().unwrap_or("-"),
                    payload.attempts
                ))
            );
        }
        println!("{}", payload.content);
    }

    Ok(())
}
