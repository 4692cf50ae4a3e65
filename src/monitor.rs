/*!
 * Periodic health monitor
 *
 * Exercises the client's pipeline against the service health endpoint:
 * one probe at startup, then one per configured interval. Probe failures
 * are logged and counted, never raised — the monitor's only effect on
 * application-visible behavior is whatever its probes naturally do to the
 * shared circuit breaker.
 *
 * The monitor is an owned task with an explicit lifecycle: `spawn`
 * returns a handle whose `stop` signals shutdown and awaits the task.
 */

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::MemoryClient;
use crate::telemetry::TelemetryEvent;

/// Handle to a running health monitor
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the monitor task to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Start the monitor, or return `None` when health checks are disabled
/// by configuration.
pub fn spawn(client: Arc<MemoryClient>) -> Option<MonitorHandle> {
    if !client.config().enable_health_checks {
        tracing::info!("health checks disabled");
        return None;
    }

    let interval = client.config().health_check_interval();
    tracing::info!(interval_secs = interval.as_secs(), "health monitor starting");

    let (shutdown, mut rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                // The first tick completes immediately: the startup probe
                _ = ticker.tick() => probe(&client).await,
                _ = rx.changed() => {
                    tracing::info!("health monitor stopping");
                    break;
                }
            }
        }
    });

    Some(MonitorHandle { shutdown, task })
}

/// Run one probe and record its outcome. Never returns an error.
async fn probe(client: &MemoryClient) {
    let started = Instant::now();
    let result = client.check_health().await;
    let snapshot = client.breaker_snapshot().await;
    let healthy = result.is_ok();

    client.probe_counters().record(healthy);
    client.telemetry().record(TelemetryEvent::ProbeCompleted {
        healthy,
        breaker_state: snapshot.state.as_str().to_string(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    });

    match result {
        Ok(report) => {
            tracing::debug!(
                status = %report.status,
                breaker = snapshot.state.as_str(),
                "health probe ok"
            );
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                breaker = snapshot.state.as_str(),
                failures = snapshot.consecutive_failures,
                "health probe failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn config(enable: bool, interval_ms: u64) -> ClientConfig {
        // Nothing listens on the discard port: probes fail fast
        let mut config = ClientConfig::new("http://127.0.0.1:9", "sk-test");
        config.enable_health_checks = enable;
        config.health_check_interval_ms = interval_ms;
        config.max_retries = 0;
        config
    }

    #[tokio::test]
    async fn disabled_by_configuration() {
        let client = Arc::new(MemoryClient::new(config(false, 1000)).expect("client"));
        assert!(spawn(client).is_none());
    }

    #[tokio::test]
    async fn probes_are_swallowed_and_counted() {
        let client = Arc::new(MemoryClient::new(config(true, 10_000)).expect("client"));

        let handle = spawn(Arc::clone(&client)).expect("monitor did not start");
        // Long interval: only the immediate startup probe fires
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        handle.stop().await;

        let status = client.status().await;
        assert_eq!(status.probes_run, 1);
        assert_eq!(status.probes_failed, 1);
    }

    #[tokio::test]
    async fn stop_terminates_the_task() {
        let client = Arc::new(MemoryClient::new(config(true, 5)).expect("client"));

        let handle = spawn(Arc::clone(&client)).expect("monitor did not start");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.stop().await;

        let after = client.status().await.probes_run;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        // No more probes once stopped
        assert_eq!(client.status().await.probes_run, after);
    }
}
