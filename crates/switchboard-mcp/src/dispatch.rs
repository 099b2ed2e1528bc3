//! Tool invocation with routing, bounded retries and result normalization.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ConnectionSet, SharedConnection};
use crate::registry::ToolRegistry;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Default bound for a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl ToolCall {
    /// Create a tool call.
    pub fn new(name: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one dispatched tool call, ready to hand back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// Tool name the model asked for.
    pub tool_name: String,
    /// Server the call was routed to, if routing succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_key: Option<String>,
    /// Normalized text content or error message.
    pub content: String,
    /// Whether the content describes a failure.
    pub is_error: bool,
    /// Attempts made against the server.
    pub attempts: u32,
}

/// Retry and timeout policy for tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Bound for each attempt.
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl DispatchConfig {
    /// Total attempts per call.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Something that can execute tool calls. Never fails; failures come back
/// as error payloads.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute one call.
    async fn invoke(&self, call: ToolCall) -> ToolResultPayload;
}

/// Routes tool calls to their owning server.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    connections: ConnectionSet,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher over one aggregation run's registry.
    pub fn new(registry: Arc<ToolRegistry>, connections: ConnectionSet) -> Self {
        Self {
            registry,
            connections,
            config: DispatchConfig::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry calls are routed through.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn route(&self, name: &str) -> Option<(String, SharedConnection)> {
        let key = self.registry.resolve(name)?;
        let conn = self.connections.read().get(key).cloned()?;
        conn.is_connected().then(|| (key.to_string(), conn))
    }

    fn unroutable(name: &str) -> ToolResultPayload {
        tracing::error!(tool = %name, "tool could not be routed to a live server");
        ToolResultPayload {
            tool_name: name.to_string(),
            server_key: None,
            content: format!(
                "Error: Tool \"{}\" could not be routed. Unavailable or mapping failed.",
                name
            ),
            is_error: true,
            attempts: 0,
        }
    }
}

#[async_trait]
impl ToolInvoker for Dispatcher {
    async fn invoke(&self, call: ToolCall) -> ToolResultPayload {
        let Some((server_key, conn)) = self.route(&call.name) else {
            return Self::unroutable(&call.name);
        };

        let max_attempts = self.config.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            tracing::info!(
                tool = %call.name,
                server = %server_key,
                attempt,
                max_attempts,
                "calling tool"
            );

            match conn
                .call_tool(&call.name, call.arguments.clone(), self.config.call_timeout)
                .await
            {
                Ok(result) => {
                    let is_error = result.is_error();
                    let content = result.content();
                    tracing::info!(
                        tool = %call.name,
                        server = %server_key,
                        attempt,
                        max_attempts,
                        is_error,
                        kind = content.type_name(),
                        "tool call completed"
                    );
                    return ToolResultPayload {
                        tool_name: call.name,
                        server_key: Some(server_key),
                        content: content.normalize(),
                        is_error,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        tool = %call.name,
                        server = %server_key,
                        attempt,
                        max_attempts,
                        error = %e,
                        "tool call attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(
            tool = %call.name,
            server = %server_key,
            attempts = max_attempts,
            error = %last_error,
            "tool call failed after all attempts"
        );

        ToolResultPayload {
            content: format!(
                "Error executing tool {} after {} attempts: {}",
                call.name, max_attempts, last_error
            ),
            tool_name: call.name,
            server_key: Some(server_key),
            is_error: true,
            attempts: max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::RwLock;
    use serde_json::json;

    use super::*;
    use crate::connection::MockConnection;
    use crate::protocol::{CallToolResult, ToolInfo};

    fn setup(conn: Arc<MockConnection>) -> Dispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(
            "mock",
            vec![ToolInfo::new("echo"), ToolInfo::new("flaky")],
        );
        let mut map: HashMap<String, SharedConnection> = HashMap::new();
        map.insert("mock".to_string(), conn);
        Dispatcher::new(Arc::new(registry), Arc::new(RwLock::new(map)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_recover() {
        let conn = Arc::new(
            MockConnection::new("mock")
                .with_tool("flaky")
                .failing_times(2, "server busy")
                .with_result(CallToolResult::text("recovered")),
        );
        let dispatcher = setup(conn.clone());

        let payload = dispatcher.invoke(ToolCall::new("flaky", None)).await;
        assert!(!payload.is_error);
        assert_eq!(payload.content, "recovered");
        assert_eq!(payload.attempts, 3);
        assert_eq!(payload.server_key.as_deref(), Some("mock"));
        assert_eq!(conn.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts() {
        let conn = Arc::new(MockConnection::new("mock").always_failing("kaput"));
        let dispatcher = setup(conn.clone()).with_config(DispatchConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(5),
        });

        let payload = dispatcher.invoke(ToolCall::new("echo", None)).await;
        assert!(payload.is_error);
        assert_eq!(payload.attempts, 4);
        assert!(payload.content.starts_with("Error executing tool echo after 4 attempts:"));
        assert!(payload.content.contains("kaput"));
        assert_eq!(conn.call_count(), 4);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_retried() {
        let conn = Arc::new(MockConnection::new("mock"));
        let dispatcher = setup(conn.clone());

        let payload = dispatcher.invoke(ToolCall::new("nope", None)).await;
        assert!(payload.is_error);
        assert_eq!(payload.attempts, 0);
        assert_eq!(
            payload.content,
            "Error: Tool \"nope\" could not be routed. Unavailable or mapping failed."
        );
        assert_eq!(conn.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnected_server_is_unroutable() {
        let conn = Arc::new(MockConnection::new("mock"));
        conn.set_connected(false);
        let dispatcher = setup(conn.clone());

        let payload = dispatcher.invoke(ToolCall::new("echo", None)).await;
        assert_eq!(payload.attempts, 0);
        assert!(payload.content.contains("could not be routed"));
        assert_eq!(conn.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_error_result_is_not_retried() {
        let conn = Arc::new(MockConnection::new("mock").with_result(CallToolResult {
            content: Some(json!([{"type": "text", "text": "bad input"}])),
            is_error: Some(true),
        }));
        let dispatcher = setup(conn.clone());

        let payload = dispatcher.invoke(ToolCall::new("echo", Some(json!({"x": 1})))).await;
        assert!(payload.is_error);
        assert_eq!(payload.content, "bad input");
        assert_eq!(payload.attempts, 1);
        assert_eq!(conn.calls(), vec![("echo".to_string(), Some(json!({"x": 1})))]);
    }

    #[tokio::test]
    async fn test_content_shapes_are_normalized() {
        let cases = [
            (json!("hi"), "hi"),
            (json!([{"text": "a"}, {"text": "b"}]), "a\nb"),
            (json!({"foo": 1}), r#"{"foo":1}"#),
        ];
        for (content, expected) in cases {
            let conn = Arc::new(
                MockConnection::new("mock").with_result(CallToolResult::from_content(content)),
            );
            let payload = setup(conn).invoke(ToolCall::new("echo", None)).await;
            assert_eq!(payload.content, expected);
            assert!(!payload.is_error);
        }
    }

    #[test]
    fn test_default_config() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.call_timeout, Duration::from_secs(120));
    }
}
