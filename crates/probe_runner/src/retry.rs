//! Bounded exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Retry budget and backoff curve for transient failures.
///
/// Attempt `n` (zero-based retry index) waits
/// `min(initial_delay_ms * multiplier^n, max_delay_ms)` before running again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 8_000,
        }
    }
}

/// A value obtained after zero or more retries.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    /// Retries consumed from the budget.
    pub retries: u32,
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not transient; no retry was attempted for it.
    Permanent { error: E, retries: u32 },
    /// Every attempt failed transiently.
    Exhausted { last: E, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent { error, .. } => error,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
        }
    }

    pub fn with_delays(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_delay_ms = initial_ms;
        self.max_delay_ms = max_ms;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(32) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        what: &str,
        mut op: F,
        is_transient: P,
    ) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(Retried { value, retries }),
                Err(error) if !is_transient(&error) => {
                    return Err(RetryError::Permanent { error, retries });
                }
                Err(error) if retries >= self.max_retries => {
                    warn!("{} failed after {} attempts: {}", what, retries + 1, error);
                    return Err(RetryError::Exhausted {
                        last: error,
                        attempts: retries + 1,
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(retries);
                    debug!(
                        "{} hit transient error (retry {}/{}), sleeping {:?}: {}",
                        what,
                        retries + 1,
                        self.max_retries,
                        delay,
                        error
                    );
                    retries += 1;
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
