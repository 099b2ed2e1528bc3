//! Chat command - interactive REPL mode.

use anyhow::Result;
use clap::Args;

use super::Context;
use super::repl::Repl;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Include web-search servers
    #[arg(long)]
    pub web_search: bool,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let service = ctx.chat_service()?;

    let mut repl = Repl::new(service, ctx.clone(), args.web_search)?;
    let result = repl.run().await;
    repl.shutdown().await;
    result
}
