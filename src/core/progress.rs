use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::activity::{ActivityId, WorkflowId};
use crate::core::coordinator::Coordinator;

/// Heartbeat details sent before any progress has been forwarded.
pub const RUNNING_DETAILS: &str = "running";

/// Write-only handle an activity function uses to report percent complete.
///
/// Sending never blocks; once the execution is over, reports are dropped.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<u8>,
}

impl ProgressSender {
    /// Values above 100 are clamped.
    pub fn report(&self, percent_complete: u8) {
        let _ = self.tx.send(percent_complete.min(100));
    }
}

pub(crate) fn channel() -> (ProgressSender, mpsc::UnboundedReceiver<u8>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

/// Remembers the last forwarded percent value so repeats are collapsed.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_forwarded: Option<u8>,
}

impl ProgressTracker {
    /// Returns true when `percent_complete` differs from the last forwarded value.
    /// The value is recorded as forwarded in that case.
    pub fn accept(&mut self, percent_complete: u8) -> bool {
        if self.last_forwarded == Some(percent_complete) {
            return false;
        }
        self.last_forwarded = Some(percent_complete);
        true
    }

    pub fn last_forwarded(&self) -> Option<u8> {
        self.last_forwarded
    }

    pub fn heartbeat_details(&self) -> String {
        match self.last_forwarded {
            Some(percent) => format!("{percent}% complete"),
            None => RUNNING_DETAILS.to_string(),
        }
    }

    /// Forwards a new value to the coordinator. Returns whether a call was made.
    pub(crate) async fn forward(
        &mut self,
        coordinator: &dyn Coordinator,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        percent_complete: u8,
    ) -> bool {
        if !self.accept(percent_complete) {
            debug!(percent_complete, "dropping repeated progress value");
            return false;
        }

        if let Err(e) = coordinator
            .report_progress(workflow_id, activity_id, percent_complete)
            .await
        {
            warn!(
                workflow_id = %workflow_id,
                activity_id = %activity_id,
                percent_complete,
                error = %e,
                "failed to report activity progress"
            );
        }
        true
    }
}

/// Forwards progress values to the coordinator on its own task, so a slow
/// report never holds up the supervisor.
///
/// Once `stop` fires, values already sent are still forwarded and the task
/// ends. Forwarded values are published on `details` for the heartbeat loop.
pub(crate) struct ProgressForwarder {
    pub coordinator: Arc<dyn Coordinator>,
    pub workflow_id: WorkflowId,
    pub activity_id: ActivityId,
    pub progress: mpsc::UnboundedReceiver<u8>,
    pub details: watch::Sender<String>,
    pub stop: CancellationToken,
}

impl ProgressForwarder {
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut tracker = ProgressTracker::default();

        loop {
            let percent_complete = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                received = self.progress.recv() => match received {
                    Some(percent_complete) => percent_complete,
                    None => break,
                },
            };
            self.forward(&mut tracker, percent_complete).await;
        }

        self.progress.close();
        while let Some(percent_complete) = self.progress.recv().await {
            self.forward(&mut tracker, percent_complete).await;
        }
        debug!(activity_id = %self.activity_id, "progress forwarding stopped");
    }

    async fn forward(&self, tracker: &mut ProgressTracker, percent_complete: u8) {
        if tracker
            .forward(
                self.coordinator.as_ref(),
                &self.workflow_id,
                &self.activity_id,
                percent_complete,
            )
            .await
        {
            self.details.send_replace(tracker.heartbeat_details());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingCoordinator;

    #[test]
    fn repeated_values_are_collapsed() {
        let mut tracker = ProgressTracker::default();
        assert!(tracker.accept(30));
        assert!(!tracker.accept(30));
        assert!(tracker.accept(60));
        assert!(tracker.accept(30));
        assert_eq!(tracker.last_forwarded(), Some(30));
    }

    #[test]
    fn details_fall_back_to_placeholder() {
        let mut tracker = ProgressTracker::default();
        assert_eq!(tracker.heartbeat_details(), RUNNING_DETAILS);
        tracker.accept(45);
        assert_eq!(tracker.heartbeat_details(), "45% complete");
    }

    #[tokio::test]
    async fn sender_clamps_and_survives_closed_receiver() {
        let (sender, mut rx) = channel();
        sender.report(250);
        assert_eq!(rx.recv().await, Some(100));

        drop(rx);
        sender.report(10);
    }

    #[tokio::test]
    async fn forward_skips_duplicates_and_tolerates_failures() {
        let coordinator = RecordingCoordinator::new();
        coordinator.fail_progress_reports();
        let workflow_id = WorkflowId::from("wf");
        let activity_id = ActivityId::from("act");
        let mut tracker = ProgressTracker::default();

        assert!(tracker.forward(&coordinator, &workflow_id, &activity_id, 10).await);
        assert!(!tracker.forward(&coordinator, &workflow_id, &activity_id, 10).await);

        assert_eq!(coordinator.progress_reports(), vec![10]);
        assert_eq!(tracker.last_forwarded(), Some(10));
    }

    #[tokio::test]
    async fn forwarder_drains_buffered_values_after_stop() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let (sender, rx) = channel();
        let (details_tx, details_rx) = watch::channel(RUNNING_DETAILS.to_string());
        let stop = CancellationToken::new();

        sender.report(20);
        sender.report(20);
        sender.report(70);
        stop.cancel();

        ProgressForwarder {
            coordinator: coordinator.clone(),
            workflow_id: WorkflowId::from("wf"),
            activity_id: ActivityId::from("act"),
            progress: rx,
            details: details_tx,
            stop,
        }
        .spawn()
        .await
        .unwrap();

        assert_eq!(coordinator.progress_reports(), vec![20, 70]);
        assert_eq!(*details_rx.borrow(), "70% complete");

        // the receiver is closed once forwarding stops
        sender.report(90);
        assert_eq!(coordinator.progress_reports(), vec![20, 70]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_report_only_delays_the_forwarder() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        coordinator.delay_progress_reports(std::time::Duration::from_secs(60));
        let (sender, rx) = channel();
        let (details_tx, details_rx) = watch::channel(RUNNING_DETAILS.to_string());
        let stop = CancellationToken::new();

        let handle = ProgressForwarder {
            coordinator: coordinator.clone(),
            workflow_id: WorkflowId::from("wf"),
            activity_id: ActivityId::from("act"),
            progress: rx,
            details: details_tx,
            stop: stop.clone(),
        }
        .spawn();

        sender.report(10);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(coordinator.progress_reports(), vec![10]);
        assert_eq!(*details_rx.borrow(), RUNNING_DETAILS);

        stop.cancel();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
