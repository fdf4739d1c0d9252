use super::queue::Distributor;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the background monitor: every tick, requeue tasks with expired
/// heartbeats and publish queue gauges. The loop never exits on a
/// handled error; an error here means a logic bug in the scan, which is
/// logged and retried next tick.
pub fn spawn_monitor(distributor: Arc<Distributor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("monitor started (interval {:?})", interval);
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            let requeued = distributor.requeue_expired();
            if requeued > 0 {
                tracing::info!("monitor requeued {} timed-out task(s)", requeued);
            }

            let metrics = distributor.metrics();
            tracing::debug!(
                "queue_depth={} in_flight={} active_consumers={} backpressure={:.2}",
                metrics.queue_depth,
                metrics.in_flight,
                metrics.active_consumers,
                metrics.backpressure
            );
        }
    })
}
