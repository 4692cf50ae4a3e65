/*!
 * Telemetry events for reliability observability
 *
 * Structured JSON events describing what the reliability engine did:
 * retry outcomes, cache fallbacks, breaker rejections, health probes.
 * Sinks are fire-and-forget: recording never blocks and never fails the
 * caller.
 */

use serde::Serialize;
use std::sync::Arc;

/// Telemetry event for JSON serialization
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A retry loop finished, successfully or not
    RetryCompleted {
        operation: String,
        attempts: u32,
        elapsed_ms: u64,
        /// Final status code, absent when no response was ever received
        status: Option<u16>,
        success: bool,
    },
    /// A failed read was served from the fallback cache
    CacheFallback {
        operation: String,
        age_ms: u64,
    },
    /// The circuit breaker rejected a call without network I/O
    BreakerRejected {
        operation: String,
        retry_after_ms: u64,
    },
    /// A health probe completed
    ProbeCompleted {
        healthy: bool,
        breaker_state: String,
        elapsed_ms: u64,
    },
}

/// Destination for telemetry events.
///
/// Implementations must be cheap and infallible from the caller's point
/// of view.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Emits each event as a JSON line on the `recall::telemetry` log target
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: TelemetryEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "recall::telemetry", "{}", json),
            Err(e) => tracing::debug!(target: "recall::telemetry", error = %e, "unserializable event"),
        }
    }
}

/// Discards every event; used when metrics are disabled
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Pick the sink implied by configuration
pub fn sink_for(enable_metrics: bool) -> Arc<dyn TelemetrySink> {
    if enable_metrics {
        Arc::new(TracingSink)
    } else {
        Arc::new(NullSink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TelemetryEvent::RetryCompleted {
            operation: "search_memories".to_string(),
            attempts: 4,
            elapsed_ms: 1234,
            status: Some(200),
            success: true,
        };
        let json = serde_json::to_string(&event).expect("serialize failed");
        assert!(json.contains("\"type\":\"retry_completed\""));
        assert!(json.contains("\"attempts\":4"));
    }

    #[test]
    fn probe_event_carries_breaker_state() {
        let event = TelemetryEvent::ProbeCompleted {
            healthy: false,
            breaker_state: "open".to_string(),
            elapsed_ms: 5,
        };
        let json = serde_json::to_string(&event).expect("serialize failed");
        assert!(json.contains("\"breaker_state\":\"open\""));
    }
}
