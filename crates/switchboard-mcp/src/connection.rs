//! The connection seam shared by the supervisor and the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{CallToolResult, ToolInfo};

/// A live, initialized connection to one tool server.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// Key of the server this connection belongs to.
    fn key(&self) -> &str;

    /// List the server's tools.
    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolInfo>>;

    /// Invoke a tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<CallToolResult>;

    /// Whether the underlying transport is still open.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    async fn shutdown(&self) -> Result<()>;
}

/// Shared handle to a connection.
pub type SharedConnection = Arc<dyn ToolConnection>;

/// Live connections keyed by server key.
pub type ConnectionSet = Arc<RwLock<HashMap<String, SharedConnection>>>;

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockConnection, MockOutcome};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::error::McpError;

    /// Scripted result of one mock tool call.
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Return this result.
        Ok(CallToolResult),
        /// Fail with a transport error carrying this message.
        Fail(String),
    }

    impl MockOutcome {
        fn into_result(self) -> Result<CallToolResult> {
            match self {
                Self::Ok(result) => Ok(result),
                Self::Fail(msg) => Err(McpError::transport(msg)),
            }
        }
    }

    /// In-memory connection for tests.
    ///
    /// Calls consume scripted outcomes in order; once the script is empty
    /// every call returns the fallback outcome.
    pub struct MockConnection {
        key: String,
        tools: Vec<ToolInfo>,
        connected: AtomicBool,
        list_fails: AtomicBool,
        script: Mutex<VecDeque<MockOutcome>>,
        fallback: Mutex<MockOutcome>,
        calls: Mutex<Vec<(String, Option<Value>)>>,
        list_count: AtomicUsize,
        shutdown_count: AtomicUsize,
    }

    impl MockConnection {
        /// A connected mock with no tools that answers every call with "ok".
        pub fn new(key: impl Into<String>) -> Self {
            Self {
                key: key.into(),
                tools: Vec::new(),
                connected: AtomicBool::new(true),
                list_fails: AtomicBool::new(false),
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(MockOutcome::Ok(CallToolResult::text("ok"))),
                calls: Mutex::new(Vec::new()),
                list_count: AtomicUsize::new(0),
                shutdown_count: AtomicUsize::new(0),
            }
        }

        /// Add a tool with the given name.
        pub fn with_tool(mut self, name: impl Into<String>) -> Self {
            self.tools.push(ToolInfo::new(name));
            self
        }

        /// Add a full tool descriptor.
        pub fn with_tool_info(mut self, tool: ToolInfo) -> Self {
            self.tools.push(tool);
            self
        }

        /// Answer calls with this result once the script is exhausted.
        pub fn with_result(self, result: CallToolResult) -> Self {
            *self.fallback.lock() = MockOutcome::Ok(result);
            self
        }

        /// Fail the next `times` calls before falling back.
        pub fn failing_times(self, times: usize, message: &str) -> Self {
            {
                let mut script = self.script.lock();
                for _ in 0..times {
                    script.push_back(MockOutcome::Fail(message.to_string()));
                }
            }
            self
        }

        /// Fail every call.
        pub fn always_failing(self, message: &str) -> Self {
            *self.fallback.lock() = MockOutcome::Fail(message.to_string());
            self
        }

        /// Make `list_tools` fail (a failed liveness probe).
        pub fn with_failing_list(self) -> Self {
            self.list_fails.store(true, Ordering::SeqCst);
            self
        }

        /// Mark the connection as open or closed.
        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }

        /// Number of `call_tool` invocations.
        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        /// Recorded `(tool, arguments)` pairs.
        pub fn calls(&self) -> Vec<(String, Option<Value>)> {
            self.calls.lock().clone()
        }

        /// Number of `list_tools` invocations.
        pub fn list_count(&self) -> usize {
            self.list_count.load(Ordering::SeqCst)
        }

        /// Number of `shutdown` invocations.
        pub fn shutdown_count(&self) -> usize {
            self.shutdown_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolConnection for MockConnection {
        fn key(&self) -> &str {
            &self.key
        }

        async fn list_tools(&self, _timeout: Duration) -> Result<Vec<ToolInfo>> {
            self.list_count.fetch_add(1, Ordering::SeqCst);
            if self.list_fails.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
                return Err(McpError::ConnectionClosed);
            }
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<Value>,
            _timeout: Duration,
        ) -> Result<CallToolResult> {
            self.calls.lock().push((name.to_string(), arguments));
            let next = self.script.lock().pop_front();
            match next {
                Some(outcome) => outcome.into_result(),
                None => self.fallback.lock().clone().into_result(),
            }
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn shutdown(&self) -> Result<()> {
            self.shutdown_count.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_script_then_fallback() {
        let conn = MockConnection::new("srv")
            .with_tool("echo")
            .failing_times(2, "boom")
            .with_result(CallToolResult::text("done"));

        let timeout = Duration::from_secs(1);
        assert!(conn.call_tool("echo", None, timeout).await.is_err());
        assert!(conn.call_tool("echo", None, timeout).await.is_err());
        let ok = conn.call_tool("echo", None, timeout).await.unwrap();
        assert_eq!(ok.content().normalize(), "done");
        assert_eq!(conn.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_shutdown_disconnects() {
        let conn = MockConnection::new("srv").with_tool("echo");
        assert!(conn.is_connected());
        conn.shutdown().await.unwrap();
        assert!(!conn.is_connected());
        assert!(conn.list_tools(Duration::from_secs(1)).await.is_err());
        assert_eq!(conn.shutdown_count(), 1);
    }
}
