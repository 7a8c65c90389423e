//! A coordinator fake that records every call, for tests.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::core::activity::{ActivityId, TaskToken, WorkflowId};
use crate::core::coordinator::{Coordinator, CoordinatorError, Heartbeat};
use crate::core::outcome::CompletionOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorCall {
    Heartbeat {
        task_token: TaskToken,
        activity_id: ActivityId,
        details: String,
    },
    Progress {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
        percent_complete: u8,
    },
    Completion {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
        outcome: CompletionOutcome,
    },
}

#[derive(Debug, Default)]
struct Behaviour {
    cancelled: bool,
    fail_heartbeats: bool,
    fail_progress: bool,
    fail_completion: bool,
    progress_delay: Option<Duration>,
    heartbeat_delay: Option<(usize, Duration)>,
}

#[derive(Debug, Default)]
pub struct RecordingCoordinator {
    calls: Mutex<Vec<CoordinatorCall>>,
    behaviour: Mutex<Behaviour>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every following heartbeat with `cancelled = true`.
    pub fn return_cancelled(&self) {
        lock(&self.behaviour).cancelled = true;
    }

    pub fn fail_heartbeats(&self) {
        lock(&self.behaviour).fail_heartbeats = true;
    }

    pub fn fail_progress_reports(&self) {
        lock(&self.behaviour).fail_progress = true;
    }

    /// Every progress report takes `delay` before it is answered.
    pub fn delay_progress_reports(&self, delay: Duration) {
        lock(&self.behaviour).progress_delay = Some(delay);
    }

    /// Heartbeats after the first `answered` take `delay` before they are answered.
    pub fn delay_heartbeats_after(&self, answered: usize, delay: Duration) {
        lock(&self.behaviour).heartbeat_delay = Some((answered, delay));
    }

    pub fn fail_completions(&self) {
        lock(&self.behaviour).fail_completion = true;
    }

    pub fn calls(&self) -> Vec<CoordinatorCall> {
        lock(&self.calls).clone()
    }

    /// (task token, activity id, details) of every heartbeat, in order.
    pub fn heartbeats(&self) -> Vec<(TaskToken, ActivityId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CoordinatorCall::Heartbeat {
                    task_token,
                    activity_id,
                    details,
                } => Some((task_token, activity_id, details)),
                _ => None,
            })
            .collect()
    }

    pub fn progress_reports(&self) -> Vec<u8> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CoordinatorCall::Progress {
                    percent_complete, ..
                } => Some(percent_complete),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<(WorkflowId, ActivityId, CompletionOutcome)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CoordinatorCall::Completion {
                    workflow_id,
                    activity_id,
                    outcome,
                } => Some((workflow_id, activity_id, outcome)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: CoordinatorCall) {
        lock(&self.calls).push(call);
    }

    fn complete(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        outcome: CompletionOutcome,
    ) -> Result<(), CoordinatorError> {
        self.record(CoordinatorCall::Completion {
            workflow_id: workflow_id.clone(),
            activity_id: activity_id.clone(),
            outcome,
        });
        if lock(&self.behaviour).fail_completion {
            return Err(CoordinatorError::UnexpectedResponse(
                "completion rejected".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Coordinator for RecordingCoordinator {
    async fn send_heartbeat(
        &self,
        task_token: &TaskToken,
        activity_id: &ActivityId,
        details: &str,
    ) -> Result<Heartbeat, CoordinatorError> {
        self.record(CoordinatorCall::Heartbeat {
            task_token: task_token.clone(),
            activity_id: activity_id.clone(),
            details: details.to_string(),
        });
        let sent = self.heartbeats().len();
        let (fail, cancelled, delay) = {
            let behaviour = lock(&self.behaviour);
            let delay = behaviour
                .heartbeat_delay
                .filter(|(answered, _)| sent > *answered)
                .map(|(_, delay)| delay);
            (behaviour.fail_heartbeats, behaviour.cancelled, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(CoordinatorError::UnexpectedResponse(
                "heartbeat rejected".to_string(),
            ));
        }
        Ok(Heartbeat {
            activity_id: activity_id.clone(),
            cancelled,
            details: Some(details.to_string()),
        })
    }

    async fn report_progress(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        percent_complete: u8,
    ) -> Result<(), CoordinatorError> {
        self.record(CoordinatorCall::Progress {
            workflow_id: workflow_id.clone(),
            activity_id: activity_id.clone(),
            percent_complete,
        });
        let delay = lock(&self.behaviour).progress_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.behaviour).fail_progress {
            return Err(CoordinatorError::UnexpectedResponse(
                "progress rejected".to_string(),
            ));
        }
        Ok(())
    }

    async fn report_success(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        result: serde_json::Value,
    ) -> Result<(), CoordinatorError> {
        self.complete(workflow_id, activity_id, CompletionOutcome::Success { result })
    }

    async fn report_failure(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError> {
        self.complete(
            workflow_id,
            activity_id,
            CompletionOutcome::Failure {
                reason: reason.to_string(),
                details: details.to_string(),
            },
        )
    }

    async fn report_cancelled(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError> {
        self.complete(
            workflow_id,
            activity_id,
            CompletionOutcome::Cancelled {
                reason: reason.to_string(),
                details: details.to_string(),
            },
        )
    }
}
