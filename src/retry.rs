/*!
 * Bounded retry with exponential backoff and jitter
 *
 * Wraps the timed fetch primitive. Retry triggers are status 429, any
 * 5xx, and any timeout/transport failure; everything else is returned
 * immediately, including non-retryable client errors. When attempts are
 * exhausted the last received response is returned as-is (never converted
 * into a synthetic failure), or the last fetch error when no response was
 * ever received.
 *
 * Delay rules:
 * - 429 with a `Retry-After` signal: the server's timing is authoritative,
 *   no jitter is added.
 * - Everything else: base_delay * 2^retry_index plus up to one second of
 *   uniform jitter to spread out synchronized retries.
 */

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::StatusCode;
use tokio::time::sleep;

use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::transport::{FetchError, FetchResponse};

/// Upper bound of the uniform jitter added to computed backoff
const JITTER_CAP_MS: u64 = 1000;

/// Retry policy: attempt budget and backoff base
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (always >= 1)
    pub max_attempts: u32,
    /// Backoff base for the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with `extra_attempts` retries after the first attempt
    pub fn new(extra_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: extra_attempts + 1,
            base_delay,
        }
    }

    /// Single attempt, no waiting: used by health probes
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Computed backoff for the given retry (0 = first retry)
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let exponential = self.base_delay * 2u32.saturating_pow(retry_index);
        let jitter = rand::rng().random_range(0..JITTER_CAP_MS);
        exponential + Duration::from_millis(jitter)
    }

    /// Delay before re-attempting after `response`.
    ///
    /// A 429 carrying `Retry-After` bypasses the computed backoff and its
    /// jitter entirely.
    pub fn retry_delay(&self, response: &FetchResponse, retry_index: u32) -> Duration {
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(delay) = response.retry_after() {
                return delay;
            }
        }
        self.backoff_delay(retry_index)
    }
}

/// Whether a received status triggers a retry
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Result of a whole retry loop, with the observability record the
/// caller folds into its error reporting
#[derive(Debug)]
pub struct RetryOutcome {
    pub result: Result<FetchResponse, FetchError>,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Run `attempt` under `policy` until it yields a non-retryable outcome
/// or the attempt budget is spent.
pub async fn run_with_retry<F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    sink: &dyn TelemetrySink,
    mut attempt: F,
) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<FetchResponse, FetchError>>,
{
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut last_response: Option<FetchResponse> = None;

    let result = loop {
        attempts += 1;

        match attempt().await {
            Ok(response) if !is_retryable_status(response.status) => break Ok(response),
            Ok(response) => {
                if attempts >= policy.max_attempts {
                    // Budget spent: hand back the response we got, never
                    // a synthesized failure
                    break Ok(response);
                }
                let delay = policy.retry_delay(&response, attempts - 1);
                tracing::warn!(
                    operation,
                    status = response.status.as_u16(),
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retryable status, backing off"
                );
                last_response = Some(response);
                sleep(delay).await;
            }
            Err(err) => {
                if attempts >= policy.max_attempts {
                    // Prefer a real response from an earlier attempt over
                    // the trailing fetch error
                    break match last_response {
                        Some(response) => Ok(response),
                        None => Err(err),
                    };
                }
                let delay = policy.backoff_delay(attempts - 1);
                tracing::warn!(
                    operation,
                    error = %err,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, backing off"
                );
                sleep(delay).await;
            }
        }
    };

    let elapsed = started.elapsed();
    let (status, success) = match &result {
        Ok(response) => (Some(response.status.as_u16()), response.is_success()),
        Err(_) => (None, false),
    };
    sink.record(TelemetryEvent::RetryCompleted {
        operation: operation.to_string(),
        attempts,
        elapsed_ms: elapsed.as_millis() as u64,
        status,
        success,
    });

    RetryOutcome {
        result,
        attempts,
        elapsed,
    }
}
