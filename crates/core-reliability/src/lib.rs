//! Recall Core Reliability: pure-logic fault tolerance primitives
//!
//! # Overview
//!
//! This crate provides the building blocks Recall uses to keep outbound
//! calls bounded in latency and failure amplification:
//!
//! - **Circuit Breaker**: fails fast when the remote service is unhealthy
//! - **Single-Flight**: collapses concurrent identical in-flight requests
//! - **Fallback Cache**: time-bounded store of last known good responses
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - HTTP (status codes, headers, transports)
//! - The shape of any remote API
//! - Application-specific concerns
//!
//! The application crate owns the HTTP pipeline and threads its own value
//! and error types through these primitives. Notably, the circuit breaker
//! is generic over the wrapped error type: it counts failures without ever
//! inspecting them.
//!
//! # Usage Example
//!
//! ```no_run
//! use recall_core_reliability::{CircuitBreaker, CircuitBreakerConfig, CircuitError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), CircuitError<std::io::Error>> {
//! let breaker = CircuitBreaker::new(CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     success_threshold: 2,
//!     cooldown: Duration::from_secs(60),
//! });
//!
//! let value = breaker
//!     .execute(|| async {
//!         // the wrapped pipeline
//!         Ok::<_, std::io::Error>(42)
//!     })
//!     .await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod single_flight;

// Re-export main types for convenience
pub use cache::FallbackCache;
pub use circuit_breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState,
};
pub use single_flight::SingleFlight;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use recall_core_reliability::prelude::*;
/// ```
pub mod prelude {
    pub use super::cache::FallbackCache;
    pub use super::circuit_breaker::{
        BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState,
    };
    pub use super::single_flight::SingleFlight;
}
