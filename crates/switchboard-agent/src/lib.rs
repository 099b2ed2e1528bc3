//! Conversation loop for Switchboard.
//!
//! Connects the model boundary (`switchboard-llm`) to the tool servers
//! (`switchboard-mcp`):
//!
//! - [`schema::translate`] turns MCP input schemas into function declarations
//! - [`tools::declarations`] builds the model's tool list from a registry
//! - [`ConversationLoop`] drives model and tools to a final reply
//! - [`ChatService`] runs one aggregation and one loop per chat request
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard_agent::{ChatInput, ChatService};
//! use switchboard_mcp::{McpSupervisor, SupervisorOptions};
//!
//! let supervisor = Arc::new(McpSupervisor::new(SupervisorOptions::default()));
//! let service = ChatService::new(supervisor, model).with_servers(servers);
//!
//! let outcome = service.chat(ChatInput::new("What files are in my notes?")).await;
//! println!("{}", outcome.reply);
//! ```

pub mod conversation;
pub mod error;
pub mod schema;
pub mod service;
pub mod tools;

pub use conversation::{
    ChatOutcome, ChatStatus, ConversationLoop, DEFAULT_MAX_ITERATIONS,
    DEFAULT_SYSTEM_INSTRUCTION, LoopConfig, MODEL_FAILURE_REPLY, NO_RESPONSE_REPLY,
    TRUNCATED_REPLY, compose_message,
};
pub use error::{AgentError, Result};
pub use schema::translate;
pub use service::{ChatInput, ChatService, parse_web_search_toggle};
pub use tools::{DEFAULT_TOOL_DESCRIPTION, declarations};
