//! Tool result content shapes and their text normalization.

use serde_json::Value;

/// Text returned when a tool succeeds without any content.
pub const EMPTY_CONTENT_TEXT: &str = "Tool executed successfully but produced no specific content.";

/// The shape of a `tools/call` result's `content` field.
///
/// Servers are inconsistent: some return a bare string, most return an
/// array of `{type, text}` parts, and a few return arbitrary JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    /// A bare string.
    Text(String),
    /// An array of content parts.
    Parts(Vec<Value>),
    /// Any other JSON value.
    Raw(Value),
    /// Absent or null content.
    Empty,
}

impl ToolContent {
    /// Classify raw content.
    pub fn from_raw(raw: Option<Value>) -> Self {
        match raw {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::String(text)) => Self::Text(text),
            Some(Value::Array(parts)) => Self::Parts(parts),
            Some(other) => Self::Raw(other),
        }
    }

    /// JSON type name of the underlying content, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Parts(_) => "array",
            Self::Raw(Value::Object(_)) => "object",
            Self::Raw(Value::Number(_)) => "number",
            Self::Raw(Value::Bool(_)) => "boolean",
            Self::Raw(_) => "value",
            Self::Empty => "undefined",
        }
    }

    /// Flatten the content into the text handed back to the model.
    pub fn normalize(&self) -> String {
        let rendered = match self {
            Self::Text(text) => return text.clone(),
            Self::Empty => return EMPTY_CONTENT_TEXT.to_string(),
            Self::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                if !texts.is_empty() {
                    return texts.join("\n");
                }
                serde_json::to_string(parts)
            }
            Self::Raw(value) => serde_json::to_string(value),
        };

        rendered.unwrap_or_else(|e| {
            tracing::warn!(error = %e, kind = self.type_name(), "could not serialize tool content");
            format!(
                "Error: Could not process tool response content. Type: {}",
                self.type_name()
            )
        })
    }
}
