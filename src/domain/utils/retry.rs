use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::api::config_dto::RetryPolicyDto;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same pause after every failed attempt.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`, optionally plus up to `base` of jitter.
    Exponential { base: Duration, max: Duration, jitter: bool },
}

/// Bounded retry policy injected into anything that transfers data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Returned once every attempt has failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { max_attempts, backoff: Backoff::Fixed(delay) }
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        RetryPolicy { max_attempts, backoff: Backoff::Exponential { base, max, jitter: false } }
    }

    /// Pause after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max, jitter } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                let delay = base.saturating_mul(factor).min(max);
                if jitter && !base.is_zero() {
                    let extra_ms = rand::rng().random_range(0..=base.as_millis() as u64);
                    delay + Duration::from_millis(extra_ms)
                } else {
                    delay
                }
            }
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> std::result::Result<(T, u32), RetryExhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryExhausted { attempts: attempt, last_error: e });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:.1}s...",
                        label,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(5, Duration::from_secs(1))
    }
}

impl TryFrom<&RetryPolicyDto> for RetryPolicy {
    type Error = Error;

    fn try_from(dto: &RetryPolicyDto) -> Result<Self> {
        if dto.max_attempts == 0 {
            return Err(Error::ConfigError("uploadRetry.maxAttempts must be at least 1".to_string()));
        }
        let base = Duration::from_millis(dto.delay_ms);
        let backoff = match dto.backoff.to_ascii_lowercase().as_str() {
            "fixed" => Backoff::Fixed(base),
            "exponential" => Backoff::Exponential { base, max: Duration::from_millis(dto.max_delay_ms), jitter: dto.jitter },
            other => {
                return Err(Error::ConfigError(format!(
                    "uploadRetry.backoff must be 'fixed' or 'exponential', got '{}'",
                    other
                )));
            }
        };
        Ok(RetryPolicy { max_attempts: dto.max_attempts, backoff })
    }
}
