//! Model boundary for Switchboard.
//!
//! This crate defines what the conversation loop exchanges with a
//! chat-completion engine: conversation entries, function declarations and
//! model turns, plus the [`ChatModel`] trait and one concrete backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ChatModel trait                        │
//! │  - send(ChatRequest) -> ModelTurn                           │
//! │  - name()                                                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!         ┌─────────────┐              ┌─────────────┐
//!         │  Gemini     │              │  MockModel  │
//!         │  (reqwest)  │              │  (testing)  │
//!         └─────────────┘              └─────────────┘
//! ```
//!
//! Transient failures (HTTP 500/503, network errors, timeouts) are retried
//! with a fixed delay by [`with_retry`].

pub mod backend;
pub mod error;
pub mod gemini;
pub mod interaction_log;
pub mod types;

pub use backend::{
    ChatModel, DEFAULT_MODEL_RETRIES, DEFAULT_MODEL_RETRY_DELAY, SharedModel, with_retry,
};
#[cfg(any(test, feature = "testing"))]
pub use backend::MockModel;
pub use error::{LlmError, Result};
pub use gemini::{DEFAULT_GEMINI_BASE, DEFAULT_GEMINI_MODEL, GeminiBackend, GeminiConfig};
pub use interaction_log::{
    ChatRecord, InteractionLogConfig, InteractionLogger, UNKNOWN_MODEL, sanitize_model_name,
};
pub use types::{
    ChatRequest, Content, FINISH_REASON_STOP, FunctionCall, FunctionDeclaration,
    FunctionResponse, ModelTurn, Part, Role, Schema, SchemaType,
};
