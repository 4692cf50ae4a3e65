/*!
 * MemoryClient: the composition root of the reliability engine
 *
 * Every outbound call flows circuit breaker → single-flight → retry →
 * timed fetch. Successful read responses refresh the fallback cache;
 * failed reads consult it before the error is surfaced, converting an
 * outage into a degraded success while a fresh entry exists.
 *
 * The breaker, dedup map and cache are plain fields, constructed here and
 * never global: tests build as many independent clients as they need.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use recall_core_reliability::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, FallbackCache, SingleFlight,
};

use crate::api::{
    AddMemoryRequest, HealthReport, ListResponse, MemoryRecord, SearchRequest, SearchResponse,
};
use crate::config::{ClientConfig, ConfigSummary};
use crate::error::{ApiError, Result};
use crate::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::telemetry::{sink_for, TelemetryEvent, TelemetrySink};
use crate::transport::{FetchError, FetchRequest, FetchResponse, HttpTransport};

/// Probes use a short deadline regardless of the configured timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive half-open successes required to close the breaker
const BREAKER_SUCCESS_THRESHOLD: u32 = 2;

/// How an operation interacts with the fallback cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    /// Idempotent read: refreshes the cache, degrades to it on failure
    Read,
    /// Mutation: never cached, never served stale
    Write,
    /// Health probe: single attempt, short timeout, no cache interaction
    Probe,
}

/// A call result that may have been served from the fallback cache
#[derive(Debug, Clone)]
pub struct CallResult<T> {
    pub value: T,
    /// True when the live call failed and a cached payload was returned
    pub from_cache: bool,
}

/// Probe bookkeeping shared between the client and the health monitor
#[derive(Debug, Default)]
pub struct ProbeCounters {
    run: AtomicU64,
    failed: AtomicU64,
}

impl ProbeCounters {
    pub fn record(&self, healthy: bool) {
        self.run.fetch_add(1, Ordering::Relaxed);
        if !healthy {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn run_count(&self) -> u64 {
        self.run.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Breaker state as reported by the status query
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: String,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub last_failure_age_ms: Option<u64>,
}

impl From<BreakerSnapshot> for BreakerStatus {
    fn from(snapshot: BreakerSnapshot) -> Self {
        Self {
            state: snapshot.state.as_str().to_string(),
            consecutive_failures: snapshot.consecutive_failures,
            half_open_successes: snapshot.half_open_successes,
            last_failure_age_ms: snapshot.last_failure_age.map(|d| d.as_millis() as u64),
        }
    }
}

/// Snapshot returned by [`MemoryClient::status`]; a pure read
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub breaker: BreakerStatus,
    pub cache_entries: usize,
    pub in_flight: usize,
    pub probes_run: u64,
    pub probes_failed: u64,
    pub config: ConfigSummary,
}

/// Resilient client for the memory-storage API.
pub struct MemoryClient {
    config: ClientConfig,
    transport: HttpTransport,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    flights: SingleFlight<FetchResponse, ApiError>,
    cache: FallbackCache<Bytes>,
    sink: Arc<dyn TelemetrySink>,
    probes: Arc<ProbeCounters>,
}

impl MemoryClient {
    /// Build a client from validated configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let transport = HttpTransport::new(&config.api_key, config.request_timeout())?;
        let policy = RetryPolicy::new(config.max_retries, config.base_delay());
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_threshold,
            success_threshold: BREAKER_SUCCESS_THRESHOLD,
            cooldown: config.circuit_breaker_timeout(),
        });
        let sink = sink_for(config.enable_metrics);

        Ok(Self {
            config,
            transport,
            policy,
            breaker,
            flights: SingleFlight::new(),
            cache: FallbackCache::new(),
            sink,
            probes: Arc::new(ProbeCounters::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.sink
    }

    pub(crate) fn probe_counters(&self) -> &Arc<ProbeCounters> {
        &self.probes
    }

    /// Current breaker state and counters
    pub async fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot().await
    }

    /// Store a new memory. Write-type: never cached.
    pub async fn add_memory(&self, request: AddMemoryRequest) -> Result<MemoryRecord> {
        if request.content.trim().is_empty() {
            return Err(ApiError::Validation("content must not be empty".to_string()));
        }
        let body = encode(&request)?;
        let fetch = FetchRequest::new(Method::POST, self.url("/memories")).with_body(body);
        let call = self.call("add_memory", OpKind::Write, fetch).await?;
        decode(&call.value)
    }

    /// Search stored memories. Read-type: degrades to the fallback cache.
    pub async fn search_memories(
        &self,
        request: SearchRequest,
    ) -> Result<CallResult<SearchResponse>> {
        if request.query.trim().is_empty() {
            return Err(ApiError::Validation("query must not be empty".to_string()));
        }
        let body = encode(&request)?;
        let fetch = FetchRequest::new(Method::POST, self.url("/memories/search")).with_body(body);
        let call = self.call("search_memories", OpKind::Read, fetch).await?;
        Ok(CallResult {
            value: decode(&call.value)?,
            from_cache: call.from_cache,
        })
    }

    /// List stored memories. Read-type: degrades to the fallback cache.
    pub async fn list_memories(&self, user_id: Option<&str>) -> Result<CallResult<ListResponse>> {
        let url = match user_id {
            Some(user) => format!("{}?user_id={}", self.url("/memories"), user),
            None => self.url("/memories"),
        };
        let fetch = FetchRequest::new(Method::GET, url);
        let call = self.call("list_memories", OpKind::Read, fetch).await?;
        Ok(CallResult {
            value: decode(&call.value)?,
            from_cache: call.from_cache,
        })
    }

    /// Delete one memory by id
    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ApiError::Validation("memory id must not be empty".to_string()));
        }
        let fetch = FetchRequest::new(Method::DELETE, self.url(&format!("/memories/{}", id)));
        self.call("delete_memory", OpKind::Write, fetch).await?;
        Ok(())
    }

    /// Probe the service health endpoint: one attempt, short timeout,
    /// routed through the same breaker pipeline as every other call
    pub async fn check_health(&self) -> Result<HealthReport> {
        let fetch = FetchRequest::new(Method::GET, self.url("/health"));
        let call = self.call("check_health", OpKind::Probe, fetch).await?;
        decode(&call.value)
    }

    /// Observability snapshot: breaker state, cache size, in-flight
    /// count, probe counters and the active configuration. No side
    /// effects.
    pub async fn status(&self) -> ClientStatus {
        ClientStatus {
            breaker: self.breaker.snapshot().await.into(),
            cache_entries: self.cache.len().await,
            in_flight: self.flights.in_flight().await,
            probes_run: self.probes.run_count(),
            probes_failed: self.probes.failed_count(),
            config: self.config.summary(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// The full pipeline for one logical operation.
    async fn call(
        &self,
        operation: &'static str,
        kind: OpKind,
        request: FetchRequest,
    ) -> Result<CallResult<Bytes>> {
        let fingerprint = fingerprint(&request);
        let policy = match kind {
            OpKind::Probe => RetryPolicy::single_attempt(),
            _ => self.policy,
        };
        let timeout = match kind {
            OpKind::Probe => PROBE_TIMEOUT,
            _ => self.config.request_timeout(),
        };

        // The producer is shared among deduplicated waiters, so it owns
        // everything it touches.
        let producer = {
            let transport = self.transport.clone();
            let sink = Arc::clone(&self.sink);
            let target = request.url.clone();
            async move {
                let outcome = run_with_retry(&policy, operation, sink.as_ref(), || {
                    let transport = transport.clone();
                    let request = request.clone();
                    async move { transport.fetch_with_timeout(&request, timeout).await }
                })
                .await;
                resolve(&target, outcome)
            }
        };

        let gated = self
            .breaker
            .execute(|| self.flights.run(&fingerprint, producer))
            .await;

        match gated {
            Ok(response) => {
                if kind == OpKind::Read {
                    self.cache.insert(&fingerprint, response.body.clone()).await;
                }
                Ok(CallResult {
                    value: response.body,
                    from_cache: false,
                })
            }
            Err(circuit_err) => {
                let err: ApiError = circuit_err.into();
                if let ApiError::ServiceUnavailable { retry_after } = &err {
                    self.sink.record(TelemetryEvent::BreakerRejected {
                        operation: operation.to_string(),
                        retry_after_ms: retry_after.as_millis() as u64,
                    });
                }
                if kind == OpKind::Read {
                    if let Some(body) = self.degraded_read(operation, &fingerprint, &err).await {
                        return Ok(CallResult {
                            value: body,
                            from_cache: true,
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// Look up a fresh-enough cached payload for a failed read
    async fn degraded_read(
        &self,
        operation: &str,
        fingerprint: &str,
        err: &ApiError,
    ) -> Option<Bytes> {
        let age = self.cache.age(fingerprint).await?;
        let body = self.cache.get(fingerprint, self.config.cache_ttl()).await?;
        tracing::warn!(
            operation,
            error = %err,
            age_ms = age.as_millis() as u64,
            "serving stale response from fallback cache"
        );
        self.sink.record(TelemetryEvent::CacheFallback {
            operation: operation.to_string(),
            age_ms: age.as_millis() as u64,
        });
        Some(body)
    }
}

/// Map the end state of a retry loop onto the error taxonomy. A 2xx
/// response is the only success; everything else becomes the error the
/// breaker will count.
fn resolve(target: &str, outcome: RetryOutcome) -> Result<FetchResponse> {
    let RetryOutcome {
        result, attempts, ..
    } = outcome;

    match result {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) if response.status.as_u16() == 429 => Err(ApiError::RateLimited {
            target: target.to_string(),
            attempts,
            retry_after: response.retry_after(),
        }),
        Ok(response) if response.status.is_server_error() => Err(ApiError::Server {
            status: response.status.as_u16(),
            target: target.to_string(),
            attempts,
            message: response.text_snippet(),
        }),
        Ok(response) => Err(ApiError::Client {
            status: response.status.as_u16(),
            target: target.to_string(),
            message: response.text_snippet(),
        }),
        Err(FetchError::Timeout { .. }) => Err(ApiError::Timeout {
            target: target.to_string(),
            attempts,
        }),
        Err(FetchError::Transport { message }) => Err(ApiError::Transport {
            target: target.to_string(),
            attempts,
            message,
        }),
    }
}

/// Request identity: method, normalized URL, and the canonical JSON body
/// where one exists. serde_json maps are ordered, so key order in the
/// caller's input cannot produce distinct fingerprints.
fn fingerprint(request: &FetchRequest) -> String {
    match &request.body {
        Some(body) => format!("{} {} {}", request.method, request.url, body),
        None => format!("{} {}", request.method, request.url),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Validation(format!("unencodable input: {}", e)))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::Validation(format!("unexpected response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MemoryClient {
        // Port 9 (discard) is not listening; calls fail fast with a
        // transport error when a test does reach the network.
        let mut config = ClientConfig::new("http://127.0.0.1:9", "sk-test");
        config.max_retries = 0;
        config.base_delay_ms = 1;
        MemoryClient::new(config).expect("client construction failed")
    }

    #[test]
    fn fingerprint_ignores_body_key_order() {
        let a = FetchRequest::new(Method::POST, "http://x/memories/search")
            .with_body(serde_json::json!({"query": "q", "user_id": "u"}));
        let b = FetchRequest::new(Method::POST, "http://x/memories/search")
            .with_body(serde_json::json!({"user_id": "u", "query": "q"}));
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_distinguishes_method_url_and_body() {
        let get = FetchRequest::new(Method::GET, "http://x/memories");
        let delete = FetchRequest::new(Method::DELETE, "http://x/memories");
        assert_ne!(fingerprint(&get), fingerprint(&delete));

        let a = FetchRequest::new(Method::POST, "http://x/s").with_body(serde_json::json!({"q": 1}));
        let b = FetchRequest::new(Method::POST, "http://x/s").with_body(serde_json::json!({"q": 2}));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn url_joining_tolerates_trailing_slash() {
        let config = ClientConfig::new("http://127.0.0.1:9/", "sk-test");
        let client = MemoryClient::new(config).expect("client construction failed");
        assert_eq!(client.url("/health"), "http://127.0.0.1:9/health");
    }

    #[tokio::test]
    async fn validation_errors_skip_the_pipeline() {
        let client = client();

        let err = client
            .add_memory(AddMemoryRequest {
                content: "   ".to_string(),
                user_id: None,
                metadata: None,
            })
            .await
            .expect_err("blank content accepted");
        assert!(matches!(err, ApiError::Validation(_)));

        let err = client.delete_memory("").await.expect_err("blank id accepted");
        assert!(matches!(err, ApiError::Validation(_)));

        // Nothing reached the breaker
        assert_eq!(client.breaker_snapshot().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn status_reports_a_fresh_client() {
        let client = client();
        let status = client.status().await;

        assert_eq!(status.breaker.state, "closed");
        assert_eq!(status.breaker.consecutive_failures, 0);
        assert_eq!(status.cache_entries, 0);
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.probes_run, 0);
        assert_eq!(status.config.max_retries, 0);
    }

    #[test]
    fn resolve_maps_statuses_onto_the_taxonomy() {
        use bytes::Bytes;
        use reqwest::header::HeaderMap;
        use reqwest::StatusCode;

        let outcome = |status: u16| RetryOutcome {
            result: Ok(FetchResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::from_static(b"{}"),
            }),
            attempts: 4,
            elapsed: Duration::from_millis(10),
        };

        assert!(resolve("/m", outcome(200)).is_ok());
        assert!(matches!(
            resolve("/m", outcome(429)),
            Err(ApiError::RateLimited { attempts: 4, .. })
        ));
        assert!(matches!(
            resolve("/m", outcome(503)),
            Err(ApiError::Server { status: 503, .. })
        ));
        assert!(matches!(
            resolve("/m", outcome(404)),
            Err(ApiError::Client { status: 404, .. })
        ));

        let timeout = RetryOutcome {
            result: Err(FetchError::Timeout {
                elapsed: Duration::from_secs(30),
            }),
            attempts: 4,
            elapsed: Duration::from_secs(120),
        };
        assert!(matches!(
            resolve("/m", timeout),
            Err(ApiError::Timeout { attempts: 4, .. })
        ));
    }
}
