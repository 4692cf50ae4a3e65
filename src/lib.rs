/*!
 * Recall - Resilient client for a remote memory-storage API
 *
 * A reliability engine around every outbound call:
 * - Circuit breaker per client, failing fast during outages
 * - Bounded retries with exponential backoff, jitter and Retry-After
 * - Deduplication of concurrent identical requests
 * - Time-bounded fallback cache for degraded reads
 * - Periodic health probing with an explicit task lifecycle
 */

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod retry;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use api::{AddMemoryRequest, HealthReport, ListResponse, MemoryRecord, SearchRequest, SearchResponse};
pub use client::{CallResult, ClientStatus, MemoryClient};
pub use config::ClientConfig;
pub use error::{ApiError, Result};
pub use monitor::MonitorHandle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
