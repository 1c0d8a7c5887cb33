//! Per-call timeout and exponential backoff
//!
//! Network-level retries around model and tool calls. This is independent of
//! the executor's fallback reasoning, which asks the model for an answer after
//! a tool has already failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChatModel, ChatRequest, ChatResponse};
use crate::config::ExecutionConfig;
use crate::{Error, Result};

/// Timeout and backoff settings for one kind of call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on each individual attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_models(&ExecutionConfig::default())
    }
}

impl RetryPolicy {
    /// Policy applied to model calls
    pub fn for_models(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: config.model_timeout(),
        }
    }

    /// Policy applied to tool calls: a timeout but no automatic retries,
    /// since tools may have side effects
    pub fn for_tools(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: config.tool_timeout(),
        }
    }

    /// A single attempt bounded by `timeout`
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            timeout,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` under the timeout, retrying transient failures
    ///
    /// Definition errors and any non-transient error return immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(self.timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(call = label, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff_for(attempt);
                    warn!(
                        call = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a [`ChatModel`] with a [`RetryPolicy`]
pub struct RetryingModel {
    inner: Arc<dyn ChatModel>,
    policy: RetryPolicy,
}

impl RetryingModel {
    pub fn new(inner: Arc<dyn ChatModel>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ChatModel for RetryingModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let inner = self.inner.clone();
        self.policy
            .run(self.inner.name(), || {
                let inner = inner.clone();
                let request = request.clone();
                async move { inner.chat(request).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(2)
            .run("flaky", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Model("overloaded".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_definition_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("lookup", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::ToolNotFound("x".into())) }
            })
            .await;
        assert!(matches!(result, Err(Error::ToolNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let result: Result<()> = RetryPolicy::no_retry(Duration::from_millis(10))
            .run("slow", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Timeout(10))));
    }
}
