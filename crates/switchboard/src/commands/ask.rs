//! Ask command - one-shot question to the model.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::Style;

use switchboard_agent::{ChatInput, ChatOutcome};

use super::Context;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or prompt to send
    #[arg(required = true)]
    pub prompt: String,

    /// Include web-search servers
    #[arg(long)]
    pub web_search: bool,

    /// Attach a text file as context
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let service = ctx.chat_service()?;

    let mut input = ChatInput::new(args.prompt).with_web_search(args.web_search);
    if let Some(ref path) = args.file {
        input = input.with_file(path)?;
    }

    let outcome = service.chat(input).await;
    service.shutdown().await;

    print_outcome(&outcome, ctx)
}

/// Print a chat outcome as text or JSON.
pub fn print_outcome(outcome: &ChatOutcome, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let value = serde_json::json!({
            "reply": outcome.reply,
            "status": outcome.status,
            "iterations": outcome.iterations,
            "tool_calls": outcome.tool_calls,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    for call in &outcome.tool_calls {
        let status = if call.is_error { "failed" } else { "done" };
        println!(
            "{}",
            dim.apply_to(format!(
                "[{} via {}: {}]",
                call.tool_name,
                call.server_key.as_deref().unwrap_or("-"),
                status
            ))
        );
        if ctx.verbose {
            println!("{}", dim.apply_to(&call.content));
        }
    }

    println!("{}", outcome.reply);
    Ok(())
}
