//! The conversation loop driver.
//!
//! Alternates between the model and the tool servers until the model answers
//! without requesting any tool. All tool calls of one model turn are
//! dispatched concurrently and their results fed back together.
//!
//! ```text
//!   user message
//!        │
//!        ▼
//!  ┌──────────────┐  tool calls   ┌──────────────────┐
//!  │ AwaitingModel│──────────────►│AwaitingToolResults│
//!  │              │◄──────────────│  (join_all)       │
//!  └──────────────┘   responses   └──────────────────┘
//!        │ no tool calls
//!        ▼
//!      reply
//! ```

use std::fmt;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_llm::{
    ChatRequest, Content, FunctionCall, FunctionDeclaration, FunctionResponse, ModelTurn,
    SharedModel,
};
use switchboard_mcp::{ToolCall, ToolInvoker, ToolResultPayload};

/// Default cap on model round-trips per chat.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default system instruction sent with every request.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a powerful assistant with access to various tools. \
Carefully check what the user wants and whether one of your available tools is suitable for the answer. \
If so, call that tool and use its result in your response to the user.";

/// Reply when the model produced neither text nor a reason.
pub const NO_RESPONSE_REPLY: &str =
    "Sorry, I encountered an issue and could not generate a final response.";

/// Reply when the model could not be reached.
pub const MODEL_FAILURE_REPLY: &str = "Sorry, there was a problem communicating with the AI model.";

/// Reply when the iteration cap is hit.
pub const TRUNCATED_REPLY: &str = "[Response truncated: max tool iterations exceeded]";

/// Separator inserted between the user's message and attached file content.
const FILE_CONTEXT_HEADER: &str = "\nCONTEXT OF FILE\n ";

/// Append attached file content to the user's message.
pub fn compose_message(message: &str, file_context: Option<&str>) -> String {
    match file_context {
        Some(context) if !context.is_empty() => {
            format!("{}{}{}", message, FILE_CONTEXT_HEADER, context)
        }
        _ => message.to_string(),
    }
}

/// How a chat ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    /// The model answered with text.
    Completed,
    /// The model stopped without text and without a reason.
    NoResponse,
    /// The model stopped for a non-normal finish reason.
    Stopped,
    /// The prompt was blocked.
    Blocked,
    /// The iteration cap was hit.
    Truncated,
    /// The model could not be reached.
    ModelFailed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoResponse => "no_response",
            Self::Stopped => "stopped",
            Self::Blocked => "blocked",
            Self::Truncated => "truncated",
            Self::ModelFailed => "model_failed",
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one chat.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Text for the user.
    pub reply: String,
    pub status: ChatStatus,
    /// Full conversation including this exchange.
    pub history: Vec<Content>,
    /// Model round-trips made.
    pub iterations: u32,
    /// Every tool call dispatched, in order.
    pub tool_calls: Vec<ToolResultPayload>,
}

/// Loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub system_instruction: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        }
    }
}

/// Drives one model through tool calls to a final reply.
pub struct ConversationLoop {
    model: SharedModel,
    config: LoopConfig,
}

impl ConversationLoop {
    pub fn new(model: SharedModel) -> Self {
        Self {
            model,
            config: LoopConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop for one user message. Never fails.
    pub async fn run(
        &self,
        invoker: &dyn ToolInvoker,
        tools: Vec<FunctionDeclaration>,
        history: Vec<Content>,
        message: String,
    ) -> ChatOutcome {
        let started = Instant::now();
        let mut history = history;
        history.push(Content::user(message));

        let mut iterations = 0u32;
        let mut dispatched: Vec<ToolResultPayload> = Vec::new();

        tracing::info!(
            model = %self.model.name(),
            tools = tools.len(),
            history = history.len(),
            "Chat started"
        );

        loop {
            if iterations >= self.config.max_iterations {
                tracing::warn!(
                    iterations,
                    max_iterations = self.config.max_iterations,
                    "Max tool iterations exceeded"
                );
                return ChatOutcome {
                    reply: TRUNCATED_REPLY.to_string(),
                    status: ChatStatus::Truncated,
                    history,
                    iterations,
                    tool_calls: dispatched,
                };
            }
            iterations += 1;

            let mut request = ChatRequest::new(history.clone()).with_tools(tools.clone());
            request.system_instruction = self.config.system_instruction.clone();

            tracing::debug!(
                iteration = iterations,
                contents = request.history.len(),
                "Calling model"
            );

            let turn = match self.model.send(request).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!(iteration = iterations, error = %e, "Model call failed");
                    return ChatOutcome {
                        reply: MODEL_FAILURE_REPLY.to_string(),
                        status: ChatStatus::ModelFailed,
                        history,
                        iterations,
                        tool_calls: dispatched,
                    };
                }
            };

            let calls = turn.function_calls();
            if calls.is_empty() {
                let (reply, status) = final_reply(&turn);
                if let Some(content) = turn.content {
                    history.push(content);
                }
                tracing::info!(
                    iterations,
                    tool_calls = dispatched.len(),
                    status = %status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Chat completed"
                );
                return ChatOutcome {
                    reply,
                    status,
                    history,
                    iterations,
                    tool_calls: dispatched,
                };
            }

            tracing::info!(
                iteration = iterations,
                tool_count = calls.len(),
                tools = %calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
                "Executing tools"
            );

            let payloads = join_all(calls.into_iter().map(|call| invoker.invoke(to_tool_call(call)))).await;

            if let Some(content) = turn.content {
                history.push(content);
            }
            history.push(Content::function_responses(
                payloads
                    .iter()
                    .map(|p| FunctionResponse::from_text(&p.tool_name, &p.content))
                    .collect(),
            ));
            dispatched.extend(payloads);
        }
    }
}

fn to_tool_call(call: FunctionCall) -> ToolCall {
    let arguments = match call.args {
        Value::Null => None,
        args => Some(args),
    };
    ToolCall::new(call.name, arguments)
}

/// Pick the reply for a turn without tool calls.
fn final_reply(turn: &ModelTurn) -> (String, ChatStatus) {
    if turn.content.is_none() {
        if let Some(reason) = &turn.block_reason {
            tracing::warn!(reason = %reason, "Model response blocked");
            return (
                format!("My response was blocked. Reason: {}", reason),
                ChatStatus::Blocked,
            );
        }
        tracing::warn!("Model returned no content");
        return (NO_RESPONSE_REPLY.to_string(), ChatStatus::NoResponse);
    }

    if let Some(text) = turn.joined_text() {
        return (text, ChatStatus::Completed);
    }

    if turn.stopped_normally() {
        tracing::warn!("Model finished without producing a final text part");
        (NO_RESPONSE_REPLY.to_string(), ChatStatus::NoResponse)
    } else {
        let reason = turn.finish_reason.as_deref().unwrap_or_default();
        tracing::warn!(reason = %reason, "Model stopped");
        (
            format!("Processing stopped. Reason: {}", reason),
            ChatStatus::Stopped,
        )
    }
}
