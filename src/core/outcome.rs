use serde::{Deserialize, Serialize};

use crate::core::activity::{ActivityError, ActivityId, WorkflowId};
use crate::core::coordinator::{Coordinator, CoordinatorError};

/// Reason reported for every cancelled execution.
pub const CANCELLED_REASON: &str = "activity cancelled";
/// Details reported when a cancelled function returned without an error.
pub const COMPLETED_MESSAGE: &str = "completed";
/// Details reported when a cancelled function outlived the cancellation timeout.
pub const TIMEOUT_ERROR_MESSAGE: &str = "activity did not stop within the cancellation timeout";

/// The single terminal result of an execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Success { result: serde_json::Value },
    Failure { reason: String, details: String },
    Cancelled { reason: String, details: String },
}

impl CompletionOutcome {
    pub fn failure(error: &ActivityError) -> Self {
        CompletionOutcome::Failure {
            reason: error.reason.clone(),
            details: error.details.clone().unwrap_or_default(),
        }
    }

    pub fn cancelled(details: impl Into<String>) -> Self {
        CompletionOutcome::Cancelled {
            reason: CANCELLED_REASON.to_string(),
            details: details.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CompletionOutcome::Success { .. } => "success",
            CompletionOutcome::Failure { .. } => "failure",
            CompletionOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub(crate) async fn report(
        &self,
        coordinator: &dyn Coordinator,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
    ) -> Result<(), CoordinatorError> {
        match self {
            CompletionOutcome::Success { result } => {
                coordinator
                    .report_success(workflow_id, activity_id, result.clone())
                    .await
            }
            CompletionOutcome::Failure { reason, details } => {
                coordinator
                    .report_failure(workflow_id, activity_id, reason, details)
                    .await
            }
            CompletionOutcome::Cancelled { reason, details } => {
                coordinator
                    .report_cancelled(workflow_id, activity_id, reason, details)
                    .await
            }
        }
    }
}
