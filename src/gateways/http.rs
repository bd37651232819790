//! Shared HTTP call machinery for the embedding and summarizer gateways:
//! an interval rate limiter, a bounded-concurrency semaphore, and a
//! jittered exponential backoff retry loop with 429/`Retry-After` and
//! permanent-vs-transient error classification.
//!
//! The teacher's `agent/provider.rs` builds one `reqwest::Client` per
//! provider struct and calls it directly with no retry logic; this module
//! adds the retry/rate-limit layer spec.md requires around that same
//! request style.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::RaptorError;

const RETRY_BASE_SECS: f64 = 0.5;
const RETRY_CAP_SECS: f64 = 20.0;
const MAX_ATTEMPTS: usize = 5;

/// Whether an HTTP failure should be retried or surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Permanent,
}

pub fn classify_status(status: StatusCode) -> Classification {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Classification::Permanent,
        s if s.is_server_error() => Classification::Transient,
        s if s == StatusCode::TOO_MANY_REQUESTS => Classification::Transient,
        s if s.is_client_error() => Classification::Permanent,
        _ => Classification::Transient,
    }
}

/// Minimum spacing between outbound request starts, derived from an RPM
/// budget, plus a concurrency bound. Shared process-wide per gateway
/// instance (spec §5's shared-resource policy).
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_started: Arc<AtomicI64>,
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(rpm: u32, concurrency: usize) -> Self {
        let rpm = rpm.max(1);
        let min_interval = Duration::from_secs_f64(60.0 / rpm as f64);
        Self {
            min_interval,
            last_started: Arc::new(AtomicI64::new(0)),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Acquire a concurrency slot and wait out the interval since the last
    /// request start. Returns a guard that releases the slot on drop.
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        let permit = self.semaphore.clone().acquire_owned().await.expect("semaphore not closed");

        loop {
            let now = now_millis();
            let last = self.last_started.load(Ordering::SeqCst);
            let elapsed = Duration::from_millis((now - last).max(0) as u64);
            if elapsed >= self.min_interval {
                if self
                    .last_started
                    .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    break;
                }
                continue;
            }
            tokio::time::sleep(self.min_interval - elapsed).await;
        }
        permit
    }
}

fn now_millis() -> i64 {
    // Monotonic-ish wall clock in ms since an arbitrary epoch; only used
    // for relative spacing within a process lifetime.
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    Instant::now().duration_since(start).as_millis() as i64
}

/// Run `attempt` up to `MAX_ATTEMPTS` times with exponential backoff
/// (base 0.5s, doubling, capped at 20s, +/-25% jitter), honoring a
/// `Retry-After` hint from a 429 response and failing immediately on
/// permanent errors.
pub async fn with_retry<T, F, Fut>(mut attempt: F) -> Result<T, RaptorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RequestOutcome>>,
{
    let mut backoff = RETRY_BASE_SECS;
    for attempt_no in 1..=MAX_ATTEMPTS {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(RequestOutcome::Permanent(err)) => return Err(err),
            Err(RequestOutcome::Transient { err, retry_after }) => {
                if attempt_no == MAX_ATTEMPTS {
                    return Err(err);
                }
                let wait = retry_after.unwrap_or_else(|| jittered(backoff));
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                backoff = (backoff * 2.0).min(RETRY_CAP_SECS);
            }
        }
    }
    unreachable!("loop always returns within MAX_ATTEMPTS iterations")
}

fn jittered(base: f64) -> f64 {
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(-0.25..=0.25);
    (base * (1.0 + jitter)).max(0.0)
}

pub enum RequestOutcome {
    Permanent(RaptorError),
    Transient { err: RaptorError, retry_after: Option<f64> },
}

/// Parse a `Retry-After` header value, either as seconds or an HTTP-date
/// (only the seconds form is handled; an HTTP-date falls back to `None`
/// and ordinary backoff applies).
pub fn parse_retry_after(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_errors_as_permanent() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), Classification::Permanent);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), Classification::Permanent);
    }

    #[test]
    fn classifies_server_errors_as_transient() {
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), Classification::Transient);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), Classification::Transient);
    }

    #[test]
    fn classifies_429_as_transient() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), Classification::Transient);
    }

    #[test]
    fn classifies_other_4xx_as_permanent() {
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), Classification::Permanent);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), Classification::Permanent);
    }

    #[test]
    fn parses_numeric_retry_after() {
        assert_eq!(parse_retry_after(Some("12")), Some(12.0));
        assert_eq!(parse_retry_after(Some("not-a-number")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[tokio::test]
    async fn retry_returns_ok_without_retrying_on_success() {
        let mut calls = 0;
        let result = with_retry(|| {
            calls += 1;
            async { Ok::<_, RequestOutcome>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_fails_fast_on_permanent_error() {
        let mut calls = 0;
        let result: Result<i32, _> = with_retry(|| {
            calls += 1;
            async { Err(RequestOutcome::Permanent(RaptorError::embedding("unauthorized"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn rate_limiter_enforces_minimum_interval() {
        let limiter = RateLimiter::new(6000, 4); // 10ms interval
        let start = std::time::Instant::now();
        let _p1 = limiter.acquire().await;
        drop(_p1);
        let _p2 = limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(8));
    }
}
