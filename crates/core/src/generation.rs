use crate::error::{BackendError, ConfigError, FailureClass, GenerationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A hosted text generation service addressed by backend identifier
/// (a model name such as `gemini-1.5-flash`).
#[async_trait]
pub trait GenerationBackend {
    async fn generate(&self, identifier: &str, prompt: &str) -> Result<String, BackendError>;
}

#[async_trait]
impl<B: GenerationBackend + Send + Sync + ?Sized> GenerationBackend for &B {
    async fn generate(&self, identifier: &str, prompt: &str) -> Result<String, BackendError> {
        (**self).generate(identifier, prompt).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per identifier, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry; `1.0` keeps it fixed.
    pub multiplier: f64,
    /// Upper bound on the summed backoff sleeps of one `generate` call.
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_total_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// One attempt per identifier: pure fallback, no waiting.
    pub fn fallback_only() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_total_wait: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidRetryPolicy(format!(
                "backoff multiplier {} must be a finite number >= 1",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (1-based) on the same identifier.
    /// Saturates at `max_total_wait`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as i32;
        let seconds = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(seconds)
            .map_or(self.max_total_wait, |delay| delay.min(self.max_total_wait))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub backend: String,
    pub attempts: usize,
}

/// Tries each backend identifier in order, retrying retryable failures on the
/// same identifier before falling through to the next one.
pub struct FallbackClient<B>
where
    B: GenerationBackend,
{
    backend: B,
    identifiers: Vec<String>,
    retry: RetryPolicy,
}

impl<B> FallbackClient<B>
where
    B: GenerationBackend + Send + Sync,
{
    pub fn new(
        backend: B,
        identifiers: Vec<String>,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        if identifiers.iter().all(|id| id.trim().is_empty()) {
            return Err(ConfigError::NoBackends);
        }
        retry.validate()?;

        Ok(Self {
            backend,
            identifiers: identifiers
                .into_iter()
                .filter(|id| !id.trim().is_empty())
                .collect(),
            retry,
        })
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the first successful generation. `deadline` bounds every
    /// backend call and every backoff sleep; once it passes the chain stops
    /// with a timeout failure.
    pub async fn generate(
        &self,
        prompt: &str,
        deadline: Option<Instant>,
    ) -> Result<Generated, GenerationError> {
        let mut attempts = 0usize;
        let mut waited = Duration::ZERO;
        let mut last_error: Option<BackendError> = None;

        'identifiers: for identifier in &self.identifiers {
            for attempt in 1..=self.retry.max_attempts {
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    last_error = Some(deadline_error(identifier));
                    break 'identifiers;
                }

                attempts += 1;
                let error = match self.call(identifier, prompt, deadline).await {
                    Ok(text) => {
                        info!(backend = %identifier, attempts, "generation succeeded");
                        return Ok(Generated {
                            text,
                            backend: identifier.clone(),
                            attempts,
                        });
                    }
                    Err(error) => error,
                };

                warn!(
                    backend = %identifier,
                    attempt,
                    class = %error.class,
                    details = %error.details,
                    "generation attempt failed"
                );

                let retryable = error.class.is_retryable();
                last_error = Some(error);

                if deadline.is_some_and(|at| Instant::now() >= at) {
                    break 'identifiers;
                }
                if !retryable || attempt == self.retry.max_attempts {
                    continue 'identifiers;
                }

                let delay = self.retry.delay_for(attempt);
                if waited.saturating_add(delay) > self.retry.max_total_wait {
                    debug!(backend = %identifier, "retry wait budget spent, falling through");
                    continue 'identifiers;
                }
                if deadline.is_some_and(|at| Instant::now() + delay >= at) {
                    last_error = Some(deadline_error(identifier));
                    break 'identifiers;
                }

                tokio::time::sleep(delay).await;
                waited += delay;
            }
        }

        let (last_error, class) = match last_error {
            Some(error) => (error.to_string(), error.class),
            None => ("no generation attempt was made".to_string(), FailureClass::Other),
        };

        Err(GenerationError::Unavailable {
            last_error,
            class,
            attempts,
        })
    }

    async fn call(
        &self,
        identifier: &str,
        prompt: &str,
        deadline: Option<Instant>,
    ) -> Result<String, BackendError> {
        match deadline {
            Some(at) => tokio::time::timeout_at(at, self.backend.generate(identifier, prompt))
                .await
                .unwrap_or_else(|_| Err(deadline_error(identifier))),
            None => self.backend.generate(identifier, prompt).await,
        }
    }
}

fn deadline_error(identifier: &str) -> BackendError {
    BackendError::new(identifier, FailureClass::Timeout, "deadline exceeded")
}
