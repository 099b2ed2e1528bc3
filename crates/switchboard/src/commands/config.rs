//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show effective settings with defaults filled in
    Show,

    /// Show which settings files were checked and loaded
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let resolved = ctx.loaded.settings.resolved();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        print!("{}", resolved.to_toml()?);
    }
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    if ctx.json_output {
        let sources: Vec<serde_json::Value> = loaded
            .sources
            .iter()
            .map(|s| serde_json::json!({ "path": s.path, "loaded": s.loaded }))
            .collect();
        let value = serde_json::json!({
            "config_dir": loaded.config_dir,
            "user_config": loaded.user_config_path(),
            "sources": sources,
            "servers_file": ctx.servers_path(),
            "logs_dir": loaded.logs_dir(),
            "interactions_dir": loaded.interactions_dir(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();

    println!("{}", style("Settings files").bold());
    for source in &loaded.sources {
        let marker = if source.loaded {
            green.apply_to("●").to_string()
        } else {
            dim.apply_to("○").to_string()
        };
        println!("  {} {}", marker, source.path.display());
    }
    println!();
    println!("Config dir:   {}", loaded.config_dir.display());
    println!("User config:  {}", loaded.user_config_path().display());
    println!("Servers file: {}", ctx.servers_path().display());
    println!("Logs:         {}", loaded.logs_dir().display());
    println!("Chat log:     {}", loaded.interactions_dir().display());

    for warning in &loaded.warnings {
        println!("{} {}", Style::new().yellow().apply_to("Warning:"), warning);
    }
    Ok(())
}
