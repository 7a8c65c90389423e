//! Heartbeat loop for a supervised activity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::activity::{ActivityId, TaskToken};
use crate::core::coordinator::{Coordinator, Heartbeat};

/// Sends a heartbeat every `interval` until `shutdown` fires.
///
/// The first heartbeat answered with `cancelled = true` is forwarded on
/// `cancellation`; later ones only keep the activity alive.
pub(crate) struct HeartbeatLoop {
    pub coordinator: Arc<dyn Coordinator>,
    pub task_token: TaskToken,
    pub activity_id: ActivityId,
    pub interval: Duration,
    pub details: watch::Receiver<String>,
    pub cancellation: mpsc::Sender<Heartbeat>,
    pub shutdown: CancellationToken,
}

impl HeartbeatLoop {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancellation = Some(self.cancellation);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let details = self.details.borrow().clone();
            let response = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                response = self
                    .coordinator
                    .send_heartbeat(&self.task_token, &self.activity_id, &details) => response,
            };

            match response {
                Ok(heartbeat) if heartbeat.cancelled => {
                    if let Some(tx) = cancellation.take() {
                        info!(
                            activity_id = %self.activity_id,
                            details = heartbeat.details.as_deref().unwrap_or_default(),
                            "activity cancellation requested by coordinator"
                        );
                        let _ = tx.send(heartbeat).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(activity_id = %self.activity_id, error = %e, "heartbeat failed");
                }
            }
        }

        debug!(activity_id = %self.activity_id, "heartbeat loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCoordinator;

    fn start(
        coordinator: Arc<RecordingCoordinator>,
        interval: Duration,
    ) -> (
        JoinHandle<()>,
        mpsc::Receiver<Heartbeat>,
        watch::Sender<String>,
        CancellationToken,
    ) {
        let (details_tx, details_rx) = watch::channel("running".to_string());
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let handle = HeartbeatLoop {
            coordinator,
            task_token: TaskToken::from("token"),
            activity_id: ActivityId::from("act"),
            interval,
            details: details_rx,
            cancellation: cancel_tx,
            shutdown: shutdown.clone(),
        }
        .spawn();
        (handle, cancel_rx, details_tx, shutdown)
    }

    #[tokio::test(start_paused = true)]
    async fn first_heartbeat_waits_one_interval() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let (handle, _cancel_rx, _details, shutdown) =
            start(coordinator.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(coordinator.heartbeats().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(coordinator.heartbeats().len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sends_latest_details() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let (handle, _cancel_rx, details, shutdown) =
            start(coordinator.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(15)).await;
        details.send_replace("40% complete".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.cancel();
        handle.await.unwrap();

        let heartbeats = coordinator.heartbeats();
        assert_eq!(heartbeats[0].2, "running");
        assert_eq!(heartbeats[1].2, "40% complete");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_signalled_once_and_ticking_continues() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        coordinator.return_cancelled();
        let (handle, mut cancel_rx, _details, shutdown) =
            start(coordinator.clone(), Duration::from_millis(10));

        let heartbeat = cancel_rx.recv().await.unwrap();
        assert!(heartbeat.cancelled);
        assert_eq!(heartbeat.details.as_deref(), Some("running"));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(coordinator.heartbeats().len() >= 3);

        // the loop gave up its sender after the first signal
        assert!(cancel_rx.recv().await.is_none());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        coordinator.fail_heartbeats();
        let (handle, _cancel_rx, _details, shutdown) =
            start(coordinator.clone(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(coordinator.heartbeats().len(), 3);

        shutdown.cancel();
        handle.await.unwrap();
        let sent = coordinator.heartbeats().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(coordinator.heartbeats().len(), sent);
    }
}
