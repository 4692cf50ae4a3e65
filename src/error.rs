/*!
 * Error types for Recall
 */

use std::time::Duration;
use thiserror::Error;

use recall_core_reliability::CircuitError;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Failure kinds surfaced by the client.
///
/// Every variant carries enough context for the caller to render an
/// actionable message: the target that was called, the attempt count where
/// retries happened, and the HTTP status where one was received. Variants
/// are `Clone` because deduplicated callers all receive the same error.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// An attempt exceeded its deadline, and retries were exhausted
    #[error("request to {target} timed out after {attempts} attempt(s)")]
    Timeout { target: String, attempts: u32 },

    /// Connection-level failure before any response, retries exhausted
    #[error("request to {target} failed after {attempts} attempt(s): {message}")]
    Transport {
        target: String,
        attempts: u32,
        message: String,
    },

    /// HTTP 429 survived all retries
    #[error("rate limited by {target} after {attempts} attempt(s)")]
    RateLimited {
        target: String,
        attempts: u32,
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx survived all retries
    #[error("{target} returned server error {status} after {attempts} attempt(s): {message}")]
    Server {
        status: u16,
        target: String,
        attempts: u32,
        message: String,
    },

    /// HTTP 4xx other than 429, returned as-is without retrying
    #[error("{target} rejected the request with status {status}: {message}")]
    Client {
        status: u16,
        target: String,
        message: String,
    },

    /// The circuit breaker rejected the call without attempting network I/O
    #[error("service unavailable, circuit open for {}s", retry_after.as_secs())]
    ServiceUnavailable { retry_after: Duration },

    /// Caller-supplied input was malformed
    #[error("invalid input: {0}")]
    Validation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status associated with this failure, where one applies
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } | ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Number of attempts made before this failure surfaced
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ApiError::Timeout { attempts, .. }
            | ApiError::Transport { attempts, .. }
            | ApiError::RateLimited { attempts, .. }
            | ApiError::Server { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // Fatal: the process was misconfigured or misused
            ApiError::Config(_) | ApiError::Validation(_) => EXIT_FATAL,
            // Everything else is a runtime failure of one call
            _ => EXIT_FAILURE,
        }
    }
}

impl From<CircuitError<ApiError>> for ApiError {
    fn from(err: CircuitError<ApiError>) -> Self {
        match err {
            CircuitError::Open { retry_after } => ApiError::ServiceUnavailable { retry_after },
            CircuitError::Inner(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reported_for_http_failures() {
        let err = ApiError::Server {
            status: 503,
            target: "/memories".to_string(),
            attempts: 4,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.attempts(), Some(4));

        let err = ApiError::RateLimited {
            target: "/memories".to_string(),
            attempts: 4,
            retry_after: None,
        };
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn transport_failures_carry_no_status() {
        let err = ApiError::Timeout {
            target: "/memories".to_string(),
            attempts: 2,
        };
        assert_eq!(err.status(), None);
        assert_eq!(err.attempts(), Some(2));
    }

    #[test]
    fn breaker_rejection_flattens_to_service_unavailable() {
        let err: ApiError = CircuitError::<ApiError>::Open {
            retry_after: Duration::from_secs(42),
        }
        .into();
        assert!(matches!(err, ApiError::ServiceUnavailable { .. }));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn config_errors_are_fatal() {
        assert_eq!(
            ApiError::Config("missing key".to_string()).exit_code(),
            EXIT_FATAL
        );
    }
}
