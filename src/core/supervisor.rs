//! Runs one activity function to a single reported outcome.

use std::sync::Arc;

use futures::{future, FutureExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::core::activity::{ActivityContext, ActivityError, ActivityFn, ExecutionRequest};
use crate::core::config::SupervisorConfig;
use crate::core::coordinator::Coordinator;
use crate::core::error::SupervisorError;
use crate::core::heartbeat::HeartbeatLoop;
use crate::core::outcome::{CompletionOutcome, COMPLETED_MESSAGE, TIMEOUT_ERROR_MESSAGE};
use crate::core::progress::{self, ProgressForwarder, RUNNING_DETAILS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    CancellationRequested { deadline: Option<Instant> },
}

impl State {
    fn deadline(&self) -> Option<Instant> {
        match self {
            State::Running => None,
            State::CancellationRequested { deadline } => *deadline,
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[derive(Clone)]
pub struct Supervisor {
    coordinator: Arc<dyn Coordinator>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;
        Ok(Self {
            coordinator,
            config,
        })
    }

    /// Run `activity` while heartbeating it and forwarding its progress, then
    /// report exactly one outcome to the coordinator.
    ///
    /// The activity sees a child of `parent`. It is cancelled when a heartbeat
    /// answer says so; if it then keeps running past the configured
    /// cancellation timeout it is abandoned and reported as cancelled.
    #[instrument(
        name = "supervise_activity",
        skip_all,
        fields(
            workflow_id = %request.workflow_id,
            activity_id = %request.activity_id,
        )
    )]
    pub async fn run<T, F>(
        &self,
        parent: &CancellationToken,
        request: ExecutionRequest,
        activity: F,
    ) -> Result<CompletionOutcome, SupervisorError>
    where
        T: Serialize + Send + 'static,
        F: ActivityFn<T>,
    {
        let ExecutionRequest {
            workflow_id,
            activity_id,
            task_token,
        } = request;

        let activity_cancel = parent.child_token();
        let (progress_tx, progress_rx) = progress::channel();
        let context = ActivityContext::new(
            workflow_id.clone(),
            activity_id.clone(),
            activity_cancel.clone(),
        );
        let mut activity_task = tokio::spawn(activity.call(context, progress_tx));
        info!("activity started");

        let (details_tx, details_rx) = watch::channel(RUNNING_DETAILS.to_string());
        let stop_progress = CancellationToken::new();
        let mut forwarder = ProgressForwarder {
            coordinator: self.coordinator.clone(),
            workflow_id: workflow_id.clone(),
            activity_id: activity_id.clone(),
            progress: progress_rx,
            details: details_tx,
            stop: stop_progress.clone(),
        }
        .spawn();

        let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let heartbeat = HeartbeatLoop {
            coordinator: self.coordinator.clone(),
            task_token,
            activity_id: activity_id.clone(),
            interval: self.config.heartbeat_interval,
            details: details_rx,
            cancellation: cancel_tx,
            shutdown: shutdown.clone(),
        }
        .spawn();

        let mut state = State::Running;
        let mut cancel_signal_open = true;

        // The function's return is preferred over a cancellation signal or a
        // deadline that become ready in the same step.
        let outcome = loop {
            tokio::select! {
                biased;
                joined = &mut activity_task => {
                    break outcome_for_return(state, joined);
                }
                signal = cancel_rx.recv(), if cancel_signal_open && state == State::Running => {
                    match signal {
                        Some(_) => {
                            let deadline = self
                                .config
                                .cancellation_timeout
                                .map(|timeout| Instant::now() + timeout);
                            activity_cancel.cancel();
                            state = State::CancellationRequested { deadline };
                            info!(
                                timeout = ?self.config.cancellation_timeout,
                                "cancelling activity"
                            );
                        }
                        None => cancel_signal_open = false,
                    }
                }
                _ = deadline_elapsed(state.deadline()) => {
                    // an activity woken by the same timer tick may not have run yet
                    task::yield_now().await;
                    if let Some(joined) = (&mut activity_task).now_or_never() {
                        break outcome_for_return(state, joined);
                    }
                    warn!("activity did not stop within the cancellation timeout, abandoning it");
                    break CompletionOutcome::cancelled(TIMEOUT_ERROR_MESSAGE);
                }
            }
        };

        shutdown.cancel();
        if let Err(e) = heartbeat.await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }

        // Progress sent before the function returned is forwarded ahead of the
        // outcome, but never past the cancellation deadline.
        stop_progress.cancel();
        tokio::select! {
            biased;
            joined = &mut forwarder => {
                if let Err(e) = joined {
                    warn!(error = %e, "progress task ended abnormally");
                }
            }
            _ = deadline_elapsed(state.deadline()) => {
                warn!("progress forwarding cut off at the cancellation deadline");
                forwarder.abort();
                let _ = (&mut forwarder).await;
            }
        }

        debug!(outcome = outcome.kind(), "reporting activity outcome");
        if let Err(e) = outcome
            .report(self.coordinator.as_ref(), &workflow_id, &activity_id)
            .await
        {
            error!(outcome = outcome.kind(), error = %e, "failed to report activity outcome");
            return Err(SupervisorError::Report { source: e });
        }

        info!(outcome = outcome.kind(), "activity finished");
        Ok(outcome)
    }
}

fn outcome_for_return<T: Serialize>(
    state: State,
    joined: Result<Result<T, ActivityError>, JoinError>,
) -> CompletionOutcome {
    let returned = joined.unwrap_or_else(|join_error| {
        Err(ActivityError::new(format!("activity panicked: {join_error}")))
    });

    match (state, returned) {
        (State::CancellationRequested { .. }, Ok(_)) => {
            CompletionOutcome::cancelled(COMPLETED_MESSAGE)
        }
        (State::CancellationRequested { .. }, Err(e)) => CompletionOutcome::cancelled(e.to_string()),
        (State::Running, Ok(value)) => match serde_json::to_value(value) {
            Ok(result) => CompletionOutcome::Success { result },
            Err(e) => CompletionOutcome::failure(
                &ActivityError::new("failed to encode activity result").with_details(e.to_string()),
            ),
        },
        (State::Running, Err(e)) => CompletionOutcome::failure(&e),
    }
}
