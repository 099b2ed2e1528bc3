//! REPL (Read-Eval-Print Loop) implementation for interactive chat.

use anyhow::Result;
use console::{Style, Term, style};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use switchboard_agent::{ChatInput, ChatService, parse_web_search_toggle};
use switchboard_llm::Content;

use super::Context;
use super::ask::print_outcome;

/// REPL state and configuration.
pub struct Repl {
    service: ChatService,
    ctx: Context,
    history: Vec<Content>,
    web_search: bool,
    editor: Editor<(), DefaultHistory>,
    term: Term,
}

enum ControlFlow {
    Continue,
    Exit,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(service: ChatService, ctx: Context, web_search: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;

        Ok(Self {
            service,
            ctx,
            history: Vec::new(),
            web_search,
            editor,
            term: Term::stdout(),
        })
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    if let Err(e) = self.send_message(line).await {
                        self.print_error(&format!("Error: {}", e));
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /exit to quit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Goodbye!");
        Ok(())
    }

    /// Close all server connections.
    pub async fn shutdown(&self) {
        self.service.shutdown().await;
    }

    /// Send a message and print the reply.
    async fn send_message(&mut self, message: &str) -> Result<()> {
        self.reload_servers();

        let input = ChatInput::new(message)
            .with_history(self.history.clone())
            .with_web_search(self.web_search);
        let outcome = self.service.chat(input).await;

        print_outcome(&outcome, &self.ctx)?;
        println!();
        self.history = outcome.history;
        Ok(())
    }

    /// Pick up edits to the server list between turns.
    fn reload_servers(&mut self) {
        match self.ctx.server_configs() {
            Ok(servers) => self.service.set_servers(servers),
            Err(e) => {
                tracing::warn!(error = %e, "Keeping previous server list");
            }
        }
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let args = parts.get(1..).unwrap_or_default();

        match cmd {
            "exit" | "quit" | "q" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "new" => {
                self.history.clear();
                self.print_dim("Started new conversation");
            }
            "web" => match args.first() {
                Some(value) => {
                    self.web_search = parse_web_search_toggle(value);
                    self.print_web_search();
                }
                None => self.print_web_search(),
            },
            "servers" => {
                self.reload_servers();
                let aggregate = self.service.aggregate(self.web_search).await;
                if aggregate.connected.is_empty() {
                    self.print_dim("No servers connected");
                }
                for key in &aggregate.connected {
                    let count = aggregate.registry.tools_for(key).count();
                    println!("{} {}", style(key).cyan(), style(format!("({} tools)", count)).dim());
                }
                for failure in &aggregate.failures {
                    self.print_error(&format!("{}: {}", failure.key, failure.error));
                }
            }
            "" => {
                self.print_dim("Type /help for available commands");
            }
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Switchboard Chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to("Type your message and press Enter to chat.")
        );
        println!(
            "{}",
            dim.apply_to("Use /help for commands, /exit or Ctrl+D to quit.")
        );
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/exit, /quit").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Forget the conversation so far", style("/new").cyan());
        println!("  {}  - Show or set web search", style("/web [on|off]").cyan());
        println!("  {}  - Connect servers and list them", style("/servers").cyan());
        println!();
    }

    fn print_web_search(&self) {
        let state = if self.web_search { "on" } else { "off" };
        self.print_dim(&format!("Web search: {}", state));
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("switchboard>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        let red = Style::new().red();
        println!("{} {}", red.apply_to("Error:"), msg);
    }
}
