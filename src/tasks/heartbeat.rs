use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::HeartbeatConfig;
use crate::database::HeartbeatProbe;

/// Background task that pings the database on a fixed interval
pub struct HeartbeatTask {
    config: HeartbeatConfig,
    probe: HeartbeatProbe,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: HeartbeatConfig,
        probe: HeartbeatProbe,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            probe,
            shutdown,
        }
    }

    /// Run until the shutdown signal arrives
    pub async fn run(mut self) {
        let interval_secs = self.config.interval_seconds.max(1);
        let mut heartbeat_timer = tokio::time::interval(Duration::from_secs(interval_secs));

        // Skip immediate first tick
        heartbeat_timer.tick().await;

        tracing::info!(
            interval_secs,
            addr = %self.probe.config().addr(),
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    let report = self.probe.ping().await;

                    // Warn if a ping is taking too long
                    if report.elapsed_ms > interval_secs * 1000 / 2 {
                        tracing::warn!(
                            elapsed_ms = report.elapsed_ms,
                            interval_ms = interval_secs * 1000,
                            "Heartbeat took more than 50% of interval"
                        );
                    }
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool_config;
    use crate::metrics::HEARTBEATS_TOTAL;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = HeartbeatConfig {
            enabled: true,
            interval_seconds: 60,
        };
        let probe = HeartbeatProbe::new(test_pool_config(closed_port().await));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, probe, shutdown_rx);

        // Spawn the task
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        // Wait a bit then send shutdown
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        // Task should complete
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_task_pings_on_interval() {
        let config = HeartbeatConfig {
            enabled: true,
            interval_seconds: 1,
        };
        let probe = HeartbeatProbe::new(test_pool_config(closed_port().await));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let failures = HEARTBEATS_TOTAL.with_label_values(&["failure"]);
        let before = failures.get();

        let task = HeartbeatTask::new(config, probe, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        // One tick plus a refused ping
        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert!(failures.get() > before);

        // Shutdown
        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }
}
