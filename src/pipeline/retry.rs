//! Bounded retry for flaky external calls.
//!
//! One operation serves every adapter: [`retry_with`] runs a call up to
//! `max_attempts` times with a fixed delay in between. An attempt fails
//! either by returning `Err` or by producing a value the validity predicate
//! rejects (e.g. a word list of the wrong length).
//!
//! The delay is fixed, not exponential. Default: 3 attempts, 2 s apart.
//!
//! On exhaustion the caller gets the last *invalid* value if one was
//! produced, otherwise an [`AdapterError`].

use crate::config::PipelineConfig;
use crate::error::AdapterError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt count and delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. At least 1.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// No delay between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
        }
    }
}

/// What a retried call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// `false` when every attempt was rejected by the predicate and this is
    /// the last rejected value.
    pub valid: bool,
}

/// Run `call` until it yields a valid value or the attempts run out.
///
/// `call` receives the 1-based attempt number.
pub async fn retry_with<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
    is_valid: P,
) -> Result<Outcome<T>, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_invalid: Option<T> = None;
    let mut last_err: Option<String> = None;

    for attempt in 1..=max_attempts {
        match call(attempt).await {
            Ok(value) if is_valid(&value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", operation, attempt);
                }
                return Ok(Outcome {
                    value,
                    attempts: attempt,
                    valid: true,
                });
            }
            Ok(value) => {
                warn!(
                    "{}: attempt {}/{} returned an invalid result",
                    operation, attempt, max_attempts
                );
                last_invalid = Some(value);
            }
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    operation, attempt, max_attempts, e
                );
                last_err = Some(e.to_string());
            }
        }

        if attempt < max_attempts && !policy.delay.is_zero() {
            sleep(policy.delay).await;
        }
    }

    if let Some(value) = last_invalid {
        warn!(
            "{}: no valid result after {} attempts, using the last one",
            operation, max_attempts
        );
        return Ok(Outcome {
            value,
            attempts: max_attempts,
            valid: false,
        });
    }

    let detail = last_err.unwrap_or_else(|| "unknown error".to_string());
    warn!("{}: giving up after {} attempts", operation, max_attempts);
    Err(AdapterError {
        operation: operation.to_string(),
        attempts: max_attempts,
        detail,
    })
}

/// [`retry_with`] where every `Ok` value is valid.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    call: F,
) -> Result<T, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with(policy, operation, call, |_| true)
        .await
        .map(|o| o.value)
}
