//! Model trait and retry helper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::types::{ChatRequest, ModelTurn};

/// Default number of retries for transient model failures.
pub const DEFAULT_MODEL_RETRIES: u32 = 2;

/// Default fixed delay between model retries.
pub const DEFAULT_MODEL_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Execute an async operation, retrying transient errors with a fixed delay.
///
/// Makes at most `max_retries + 1` attempts. Errors whose
/// [`LlmError::is_retryable`] is false are returned immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    delay: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt <= max_retries => {
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Model request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        backend = backend_name,
                        attempts = attempt,
                        error = %e,
                        "Model request failed after all retries"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// A chat-completion engine that understands function declarations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the conversation and get the model's next turn.
    async fn send(&self, request: ChatRequest) -> Result<ModelTurn>;

    /// Model name, used for logging and chat-log file naming.
    fn name(&self) -> &str;
}

/// A shared model reference.
pub type SharedModel = Arc<dyn ChatModel>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Model (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted model for testing.
///
/// Turns are returned in order; once they run out every request fails.
#[cfg(any(test, feature = "testing"))]
pub struct MockModel {
    name: String,
    turns: parking_lot::Mutex<std::collections::VecDeque<Result<ModelTurn>>>,
    request_log: parking_lot::Mutex<Vec<ChatRequest>>,
}

#[cfg(any(test, feature = "testing"))]
impl MockModel {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            name: "mock-model".to_string(),
            turns: parking_lot::Mutex::new(turns.into_iter().map(Ok).collect()),
            request_log: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// A mock that answers once with plain text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![ModelTurn::text(text)])
    }

    /// A mock whose first request fails with `error`.
    pub fn failing(error: LlmError) -> Self {
        let mock = Self::new(Vec::new());
        mock.turns.lock().push_back(Err(error));
        mock
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Queue another turn.
    pub fn push_turn(&self, turn: ModelTurn) {
        self.turns.lock().push_back(Ok(turn));
    }

    /// Queue an error.
    pub fn push_error(&self, error: LlmError) {
        self.turns.lock().push_back(Err(error));
    }

    /// All requests made to this model.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl ChatModel for MockModel {
    async fn send(&self, request: ChatRequest) -> Result<ModelTurn> {
        self.request_log.lock().push(request);
        self.turns.lock().pop_front().unwrap_or_else(|| {
            Err(LlmError::Backend(
                "MockModel: no more responses available".to_string(),
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_recovers() {
        let calls = AtomicU32::new(0);
        let result = with_retry(2, Duration::from_millis(1500), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Server {
                        status: 503,
                        message: "Service Unavailable".to_string(),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(10), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Network("fetch failed".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, Duration::from_millis(10), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Auth("bad key".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_model_scripted_turns() {
        let mock = MockModel::new(vec![ModelTurn::text("one"), ModelTurn::text("two")]);

        let first = mock.send(ChatRequest::default()).await.unwrap();
        let second = mock.send(ChatRequest::default()).await.unwrap();
        assert_eq!(first.joined_text().as_deref(), Some("one"));
        assert_eq!(second.joined_text().as_deref(), Some("two"));

        let err = mock.send(ChatRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("no more responses"));
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_model_failing() {
        let mock = MockModel::failing(LlmError::Network("down".to_string())).with_name("m");
        assert_eq!(mock.name(), "m");
        assert!(mock.send(ChatRequest::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_model_queue_after_creation() {
        let mock = MockModel::new(Vec::new());
        mock.push_error(LlmError::Timeout("slow".to_string()));
        mock.push_turn(ModelTurn::text("late"));

        assert!(matches!(
            mock.send(ChatRequest::default()).await,
            Err(LlmError::Timeout(_))
        ));
        let turn = mock.send(ChatRequest::default()).await.unwrap();
        assert_eq!(turn.joined_text().as_deref(), Some("late"));
    }
}
