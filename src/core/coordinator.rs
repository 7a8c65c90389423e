//! The workflow coordinator as seen from a worker.

use serde::{Deserialize, Serialize};

use crate::core::activity::{ActivityId, TaskToken, WorkflowId};

/// Coordinator's answer to a heartbeat.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    pub activity_id: ActivityId,
    pub cancelled: bool,
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("request to coordinator failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not decode coordinator response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("activity not known to coordinator")]
    NotFound,

    #[error("activity already completed")]
    AlreadyCompleted,

    #[error("unexpected coordinator response: {0}")]
    UnexpectedResponse(String),
}

#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    async fn send_heartbeat(
        &self,
        task_token: &TaskToken,
        activity_id: &ActivityId,
        details: &str,
    ) -> Result<Heartbeat, CoordinatorError>;

    async fn report_progress(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        percent_complete: u8,
    ) -> Result<(), CoordinatorError>;

    async fn report_success(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        result: serde_json::Value,
    ) -> Result<(), CoordinatorError>;

    async fn report_failure(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError>;

    async fn report_cancelled(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError>;
}
