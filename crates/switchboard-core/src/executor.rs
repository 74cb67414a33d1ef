//! Provider call execution with timeout, retry and backoff.
//!
//! Each attempt is bounded by the configured timeout. Transient failures are
//! retried with exponential backoff and jitter up to `max_retries` times;
//! permanent failures return immediately since they would recur identically.

use std::time::{Duration, Instant};

use rand::Rng;

use switchboard_types::config::ExecutorConfig;
use switchboard_types::dispatch::ProviderReply;
use switchboard_types::error::{ProviderError, ProviderErrorKind};

use crate::client::box_client::BoxProviderClient;
use crate::client::provider::InvokeRequest;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Whether a failure is worth retrying and falling back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

/// Classification table keyed on the client-reported error kind.
pub fn classify(kind: ProviderErrorKind) -> FailureClass {
    match kind {
        ProviderErrorKind::Timeout
        | ProviderErrorKind::Connection
        | ProviderErrorKind::RateLimited
        | ProviderErrorKind::Server
        | ProviderErrorKind::InvalidResponse => FailureClass::Transient,
        ProviderErrorKind::MalformedRequest
        | ProviderErrorKind::Unauthorized
        | ProviderErrorKind::Forbidden
        | ProviderErrorKind::NotFound => FailureClass::Permanent,
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Exponential delay before retry number `retry` (1-based), capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Delay with full jitter: uniform in `[0, delay_for_retry(retry)]`. A
    /// server-provided `Retry-After` raises the floor but never past
    /// `max_backoff`.
    pub fn backoff(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_retry(retry);
        let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
        let jittered = Duration::from_millis(jitter_ms);

        match retry_after {
            Some(floor) => jittered.max(floor).min(self.max_backoff),
            None => jittered,
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A successful execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub reply: ProviderReply,
    /// Invocations made, including the successful one.
    pub attempts: u32,
    pub latency_ms: u64,
}

/// A failed execution, after any retries.
#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub error: ProviderError,
    pub class: FailureClass,
    pub attempts: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Self {
        Self { timeout, policy }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(
            Duration::from_millis(config.timeout_ms),
            RetryPolicy::from_config(config),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke `client`, retrying transient failures.
    ///
    /// Cancellation is the caller's concern: dropping the returned future
    /// aborts the in-flight call and any pending backoff sleep.
    pub async fn execute(
        &self,
        client: &BoxProviderClient,
        request: &InvokeRequest,
    ) -> Result<Execution, ExecutionFailure> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.timeout, client.invoke(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    format!("no response within {}ms", self.timeout.as_millis()),
                )),
            };

            let error = match result {
                Ok(reply) => {
                    return Ok(Execution {
                        reply,
                        attempts,
                        latency_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Err(error) => error,
            };

            let class = classify(error.kind);
            let retry = attempts; // retries taken so far + 1
            if class == FailureClass::Permanent || retry > self.policy.max_retries {
                return Err(ExecutionFailure {
                    error,
                    class,
                    attempts,
                    latency_ms: started.elapsed().as_millis() as u64,
                });
            }

            let delay = self
                .policy
                .backoff(retry, error.retry_after_ms.map(Duration::from_millis));
            tracing::debug!(
                provider = %client.name(),
                attempt = attempts,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Transient provider error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use switchboard_types::task::TaskType;

    use crate::client::provider::ProviderClient;

    enum Step {
        Reply(u64),
        Fail(ProviderErrorKind),
        Hang,
    }

    struct ScriptedClient {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl ProviderClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, _request: &InvokeRequest) -> Result<ProviderReply, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(tokens)) => Ok(ProviderReply {
                    tokens_consumed: tokens,
                    content: serde_json::json!("ok"),
                }),
                Some(Step::Fail(kind)) => Err(ProviderError::new(kind, "scripted failure")),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                None => panic!("script exhausted"),
            }
        }
    }

    fn request() -> InvokeRequest {
        InvokeRequest {
            model: "m".to_string(),
            task_type: TaskType::Default,
            payload: serde_json::Value::Null,
            timeout: Duration::from_millis(50),
        }
    }

    fn executor(max_retries: u32) -> Executor {
        Executor::new(
            Duration::from_millis(50),
            RetryPolicy {
                max_retries,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        )
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify(ProviderErrorKind::Timeout), FailureClass::Transient);
        assert_eq!(classify(ProviderErrorKind::Connection), FailureClass::Transient);
        assert_eq!(classify(ProviderErrorKind::RateLimited), FailureClass::Transient);
        assert_eq!(classify(ProviderErrorKind::Server), FailureClass::Transient);
        assert_eq!(
            classify(ProviderErrorKind::MalformedRequest),
            FailureClass::Permanent
        );
        assert_eq!(
            classify(ProviderErrorKind::Unauthorized),
            FailureClass::Permanent
        );
    }

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(8000),
        };
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(7), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_retry(40), Duration::from_millis(8000));
    }

    #[test]
    fn full_jitter_spans_zero_to_delay() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(400),
            max_backoff: Duration::from_millis(1000),
        };
        let samples: Vec<Duration> = (0..500).map(|_| policy.backoff(1, None)).collect();
        assert!(samples.iter().all(|d| *d <= Duration::from_millis(400)));
        // Full jitter reaches below the half-delay floor of equal jitter.
        assert!(samples.iter().any(|d| *d < Duration::from_millis(200)));
        let with_floor = policy.backoff(1, Some(Duration::from_millis(5000)));
        assert_eq!(with_floor, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let client = BoxProviderClient::new(ScriptedClient::new(vec![Step::Reply(12)]));
        let exec = executor(2).execute(&client, &request()).await.unwrap();
        assert_eq!(exec.reply.tokens_consumed, 12);
        assert_eq!(exec.attempts, 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let client = BoxProviderClient::new(ScriptedClient::new(vec![
            Step::Fail(ProviderErrorKind::Server),
            Step::Fail(ProviderErrorKind::RateLimited),
            Step::Reply(5),
        ]));
        let exec = executor(2).execute(&client, &request()).await.unwrap();
        assert_eq!(exec.attempts, 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let client = BoxProviderClient::new(ScriptedClient::new(vec![
            Step::Fail(ProviderErrorKind::Connection),
            Step::Fail(ProviderErrorKind::Connection),
            Step::Reply(5),
        ]));
        let failure = executor(1).execute(&client, &request()).await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.class, FailureClass::Transient);
        assert_eq!(failure.error.kind, ProviderErrorKind::Connection);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let client = BoxProviderClient::new(ScriptedClient::new(vec![
            Step::Fail(ProviderErrorKind::Unauthorized),
            Step::Reply(5),
        ]));
        let failure = executor(3).execute(&client, &request()).await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.class, FailureClass::Permanent);
    }

    #[tokio::test]
    async fn hung_call_times_out_as_transient() {
        let client = BoxProviderClient::new(ScriptedClient::new(vec![Step::Hang]));
        let failure = executor(0).execute(&client, &request()).await.unwrap_err();
        assert_eq!(failure.error.kind, ProviderErrorKind::Timeout);
        assert_eq!(failure.class, FailureClass::Transient);
    }
}
