//! Single-flight request deduplication
//!
//! Collapses concurrent identical requests into one underlying call. The
//! first caller for a fingerprint starts the producer; every caller that
//! arrives while it is in flight awaits the same shared future and
//! observes the identical outcome, value or error. The map entry is
//! removed inside the shared future at the moment it completes, so at most
//! one entry per fingerprint exists and a later call always starts fresh.
//!
//! Values and errors must be `Clone`: each waiter receives its own copy of
//! the single outcome.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

type SharedFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Deduplicates concurrent identical requests by fingerprint.
pub struct SingleFlight<T, E> {
    in_flight: Arc<Mutex<HashMap<String, SharedFlight<T, E>>>>,
}

impl<T, E> std::fmt::Debug for SingleFlight<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").finish_non_exhaustive()
    }
}

impl<T, E> Clone for SingleFlight<T, E> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E> {
    /// Create an empty single-flight group
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of requests currently in flight
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run `producer` for `fingerprint`, or join the in-flight call.
    ///
    /// Guarantees exactly one producer in flight per fingerprint at any
    /// instant. The producer future must be `'static`: it is shared among
    /// all waiters and outlives the caller that started it.
    pub async fn run<F>(&self, fingerprint: &str, producer: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(fingerprint) {
                tracing::debug!(fingerprint, "joining in-flight request");
                existing.clone()
            } else {
                let map = Arc::clone(&self.in_flight);
                let key = fingerprint.to_string();
                let flight = async move {
                    let result = producer.await;
                    map.lock().await.remove(&key);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(fingerprint.to_string(), flight.clone());
                flight
            }
        };

        flight.await
    }
}
