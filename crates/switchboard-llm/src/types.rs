//! Conversation and function-declaration types exchanged with the model.
//!
//! Parts serialize in the shape the Gemini API expects:
//!
//! ```text
//! {"text": "..."}
//! {"functionCall": {"name": "...", "args": {...}}}
//! {"functionResponse": {"name": "...", "response": {"content": "..."}}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Finish reason reported when the model ended its turn normally.
pub const FINISH_REASON_STOP: &str = "STOP";

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// Author of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Function,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The result of a function call, fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    /// Wrap normalized tool output as `{"content": text}`.
    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: json!({ "content": text.into() }),
        }
    }

    /// The `content` text of the response, if it was built from text.
    pub fn text(&self) -> Option<&str> {
        self.response.get("content").and_then(Value::as_str)
    }
}

/// One piece of a conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// One conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// A user entry holding one text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text(text.into())])
    }

    /// A model entry holding one text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::Text(text.into())])
    }

    /// A function entry carrying tool results.
    pub fn function_responses(responses: Vec<FunctionResponse>) -> Self {
        Self::new(
            Role::Function,
            responses.into_iter().map(Part::FunctionResponse).collect(),
        )
    }

    /// Text parts, in order, empty ones included.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            Part::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Function calls requested in this entry, in order.
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    /// Function responses carried by this entry, in order.
    pub fn responses(&self) -> impl Iterator<Item = &FunctionResponse> {
        self.parts.iter().filter_map(|part| match part {
            Part::FunctionResponse(response) => Some(response),
            _ => None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Function declarations
// ─────────────────────────────────────────────────────────────────────────────

/// Type tag of a declaration schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

/// A schema node in the model's function-declaration format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

impl Schema {
    /// A leaf schema of the given type.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            description: None,
            properties: None,
            required: None,
            items: None,
        }
    }

    /// An object schema with no properties.
    pub fn empty_object() -> Self {
        Self::object(BTreeMap::new(), Vec::new())
    }

    pub fn object(properties: BTreeMap<String, Schema>, required: Vec<String>) -> Self {
        Self {
            properties: Some(properties),
            required: Some(required),
            ..Self::of(SchemaType::Object)
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Schema,
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the model sees for one round-trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub history: Vec<Content>,
    pub tools: Vec<FunctionDeclaration>,
    pub system_instruction: Option<String>,
}

impl ChatRequest {
    pub fn new(history: Vec<Content>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// The most recent conversation entry.
    pub fn last(&self) -> Option<&Content> {
        self.history.last()
    }
}

/// One model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
    pub block_reason: Option<String>,
}

impl ModelTurn {
    /// A turn with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(Content::model(text)),
            finish_reason: Some(FINISH_REASON_STOP.to_string()),
            block_reason: None,
        }
    }

    /// A turn requesting the given function calls.
    pub fn calls(calls: Vec<FunctionCall>) -> Self {
        Self {
            content: Some(Content::new(
                Role::Model,
                calls.into_iter().map(Part::FunctionCall).collect(),
            )),
            finish_reason: Some(FINISH_REASON_STOP.to_string()),
            block_reason: None,
        }
    }

    /// A turn whose prompt was blocked.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            content: None,
            finish_reason: None,
            block_reason: Some(reason.into()),
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Function calls requested in this turn.
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.content
            .as_ref()
            .map(|c| c.function_calls().cloned().collect())
            .unwrap_or_default()
    }

    /// Text parts joined with a single space, or `None` when there is no text.
    pub fn joined_text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .content
            .as_ref()
            .map(|c| c.texts().collect())
            .unwrap_or_default();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join(" "))
        }
    }

    /// True when the finish reason is absent or `STOP`.
    pub fn stopped_normally(&self) -> bool {
        self.finish_reason
            .as_deref()
            .is_none_or(|reason| reason == FINISH_REASON_STOP)
    }
}
