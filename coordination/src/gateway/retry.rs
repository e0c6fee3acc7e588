//! Retry decorator for gateways.
//!
//! Rate limits and timeouts back off exponentially with jitter; any other
//! failure waits one base delay and is returned unchanged. Each attempt is
//! bounded by a per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CompletionRequest, GatewayError, LanguageModelGateway};

/// Retry and timeout policy for gateway calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Pause after a non-transient failure.
    pub base_delay: Duration,
    /// Ceiling on any single backoff sleep.
    pub max_backoff: Duration,
    /// Bound on one attempt. `None` disables the timeout.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
            call_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after the 0-based `attempt` failed:
    /// `2^(attempt+1)` seconds plus `jitter` seconds, raised to the
    /// provider's retry-after hint and capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32, jitter: f64, hint: Option<Duration>) -> Duration {
        let exp = 2f64.powi(attempt.min(30) as i32 + 1);
        let mut delay = Duration::from_secs_f64(exp + jitter.clamp(0.0, 1.0));
        if let Some(hint) = hint {
            delay = delay.max(hint);
        }
        delay.min(self.max_backoff)
    }
}

/// Wraps any gateway with [`RetryPolicy`] semantics.
pub struct RetryingGateway<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: LanguageModelGateway> RetryingGateway<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        match self.policy.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout { after: limit }),
            },
            None => self.inner.complete(request).await,
        }
    }
}

#[async_trait]
impl<G: LanguageModelGateway> LanguageModelGateway for RetryingGateway<G> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let max_attempts = self.policy.max_attempts;
        let mut last: Option<GatewayError> = None;

        for attempt in 0..max_attempts {
            match self.attempt(request).await {
                Ok(text) => {
                    if attempt > 0 {
                        debug!(
                            purpose = %request.purpose,
                            attempt = attempt + 1,
                            "Gateway call succeeded after retry"
                        );
                    }
                    return Ok(text);
                }
                Err(e) if e.is_transient() => {
                    let hint = match &e {
                        GatewayError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let delay = self.policy.backoff_for(attempt, rand::random::<f64>(), hint);
                    warn!(
                        purpose = %request.purpose,
                        attempt = attempt + 1,
                        max_attempts,
                        category = %e.retry_category(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient gateway error"
                    );
                    last = Some(e);
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(
                        purpose = %request.purpose,
                        attempt = attempt + 1,
                        error = %e,
                        "Gateway call failed, not retrying"
                    );
                    tokio::time::sleep(self.policy.base_delay).await;
                    return Err(e);
                }
            }
        }

        Err(GatewayError::Exhausted {
            attempts: max_attempts,
            last: Box::new(
                last.unwrap_or_else(|| GatewayError::InvalidResponse("no attempts made".into())),
            ),
        })
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
