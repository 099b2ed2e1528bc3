//! Function declarations built from the merged tool namespace.

use serde_json::Value;
use switchboard_llm::FunctionDeclaration;
use switchboard_mcp::ToolRegistry;

use crate::schema::translate;

/// Description used when a server declares a tool without one.
pub const DEFAULT_TOOL_DESCRIPTION: &str = "No description provided";

/// One declaration per unique tool name, in registry order.
pub fn declarations(registry: &ToolRegistry) -> Vec<FunctionDeclaration> {
    registry
        .tools()
        .iter()
        .map(|tool| FunctionDeclaration {
            name: tool.info.name.clone(),
            description: tool
                .info
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOOL_DESCRIPTION.to_string()),
            parameters: translate(tool.info.input_schema.as_ref().unwrap_or(&Value::Null)),
        })
        .collect()
}
