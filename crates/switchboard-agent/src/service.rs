//! Chat service: one aggregation run plus one conversation loop per request.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use switchboard_llm::{ChatRecord, Content, InteractionLogger, SharedModel};
use switchboard_mcp::{Aggregate, DispatchConfig, Dispatcher, McpServerConfig, McpSupervisor};

use crate::conversation::{ChatOutcome, ConversationLoop, LoopConfig, compose_message};
use crate::error::{AgentError, Result};
use crate::tools::declarations;

/// Values of the web-search toggle that mean "enabled".
const WEB_SEARCH_ON: &[&str] = &["true", "on", "1"];

/// Parse a web-search toggle value. Anything unrecognized means off.
pub fn parse_web_search_toggle(value: &str) -> bool {
    let value = value.trim();
    WEB_SEARCH_ON.iter().any(|on| value.eq_ignore_ascii_case(on))
}

/// One chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub message: String,
    /// Prior conversation.
    pub history: Vec<Content>,
    /// Extracted text of an attached file.
    pub file_context: Option<String>,
    pub web_search: bool,
}

impl ChatInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Content>) -> Self {
        self.history = history;
        self
    }

    pub fn with_file_context(mut self, context: impl Into<String>) -> Self {
        self.file_context = Some(context.into());
        self
    }

    /// Attach the contents of a text file.
    pub fn with_file(self, path: &Path) -> Result<Self> {
        let context = std::fs::read_to_string(path)
            .map_err(|e| AgentError::file_context(path.display().to_string(), e))?;
        Ok(self.with_file_context(context))
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}

/// Ties the supervisor, the model and the chat log together.
pub struct ChatService {
    supervisor: Arc<McpSupervisor>,
    servers: Vec<McpServerConfig>,
    conversation: ConversationLoop,
    dispatch: DispatchConfig,
    logger: InteractionLogger,
}

impl ChatService {
    pub fn new(supervisor: Arc<McpSupervisor>, model: SharedModel) -> Self {
        Self {
            supervisor,
            servers: Vec::new(),
            conversation: ConversationLoop::new(model),
            dispatch: DispatchConfig::default(),
            logger: InteractionLogger::disabled(),
        }
    }

    pub fn with_servers(mut self, servers: Vec<McpServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.conversation = self.conversation.with_config(config);
        self
    }

    pub fn with_dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    pub fn with_interaction_logger(mut self, logger: InteractionLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Replace the configured server list used by later chats.
    pub fn set_servers(&mut self, servers: Vec<McpServerConfig>) {
        self.servers = servers;
    }

    pub fn servers(&self) -> &[McpServerConfig] {
        &self.servers
    }

    pub fn supervisor(&self) -> &Arc<McpSupervisor> {
        &self.supervisor
    }

    /// Run one aggregation over the configured servers.
    pub async fn aggregate(&self, web_search: bool) -> Aggregate {
        self.supervisor.connect_all(&self.servers, web_search).await
    }

    /// Handle one chat request. Never fails.
    pub async fn chat(&self, input: ChatInput) -> ChatOutcome {
        let started = Instant::now();

        let aggregate = self.aggregate(input.web_search).await;
        let tools = declarations(&aggregate.registry);
        if none_reachable(&self.servers, &aggregate) {
            tracing::warn!(
                configured = self.servers.len(),
                failed = aggregate.failures.len(),
                "no configured MCP server is connected; chatting without tools"
            );
        }

        let dispatcher = Dispatcher::new(Arc::new(aggregate.registry), self.supervisor.connections())
            .with_config(self.dispatch);

        let message = compose_message(&input.message, input.file_context.as_deref());
        let outcome = self
            .conversation
            .run(&dispatcher, tools, input.history, message)
            .await;

        let record = ChatRecord::new(
            self.conversation.model().name(),
            &input.message,
            &outcome.reply,
            outcome.status.as_str(),
        )
        .with_duration_ms(started.elapsed().as_millis() as u64)
        .with_counts(outcome.iterations, outcome.tool_calls.len())
        .with_web_search(input.web_search);
        if let Err(e) = self.logger.log(&record) {
            tracing::warn!(error = %e, "Failed to write chat log");
        }

        outcome
    }

    /// Close every server connection.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown_all().await;
    }
}

/// Whether servers were eligible for this request but none connected.
fn none_reachable(servers: &[McpServerConfig], aggregate: &Aggregate) -> bool {
    aggregate.connected.is_empty() && servers.len() > aggregate.skipped.len()
}
