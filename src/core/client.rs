use crate::core::{
    activity::{ActivityId, TaskToken, WorkflowId},
    coordinator::{Coordinator, CoordinatorError, Heartbeat},
    outcome::CompletionOutcome,
    worker_events::{ActivityStatus, CancelActivityPayload, ServerEvent, WorkerEvent},
};

/// REST client for the coordinator's `/worker_event` endpoint.
#[derive(Clone)]
pub struct Client {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn send_event(&self, event: &WorkerEvent) -> Result<ServerEvent, CoordinatorError> {
        let text_res = self
            .client
            .post(format!("{}/worker_event", &self.base_url))
            .json(event)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(serde_json::from_str::<ServerEvent>(&text_res)?)
    }

    async fn expect_success(&self, event: &WorkerEvent) -> Result<(), CoordinatorError> {
        match self.send_event(event).await? {
            ServerEvent::GeneralSuccess { success: true } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn complete_activity(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        outcome: CompletionOutcome,
    ) -> Result<(), CoordinatorError> {
        let event = WorkerEvent::CompleteActivity {
            workflow_id: workflow_id.clone(),
            activity_id: activity_id.clone(),
            outcome,
        };
        self.expect_success(&event).await
    }

    /// Ask the coordinator for a task token for one activity of a workflow.
    pub async fn register_activity(
        &self,
        workflow_id: WorkflowId,
        activity_id: ActivityId,
    ) -> Result<TaskToken, CoordinatorError> {
        let event = WorkerEvent::RegisterActivity {
            workflow_id,
            activity_id,
        };

        match self.send_event(&event).await? {
            ServerEvent::ActivityRegistered { task_token } => Ok(task_token),
            other => Err(unexpected(other)),
        }
    }

    pub async fn describe_activity(
        &self,
        workflow_id: WorkflowId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityStatus>, CoordinatorError> {
        let event = WorkerEvent::DescribeActivity {
            workflow_id,
            activity_id,
        };

        match self.send_event(&event).await? {
            ServerEvent::ActivityStatus(status) => Ok(Some(status)),
            ServerEvent::NotFound => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Flag the activity as cancelled; the worker learns about it on its next heartbeat.
    pub async fn request_cancellation(&self, task_token: TaskToken) -> Result<(), CoordinatorError> {
        let text_res = self
            .client
            .post(format!("{}/cancel_activity", &self.base_url))
            .json(&CancelActivityPayload { task_token })
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match serde_json::from_str::<ServerEvent>(&text_res)? {
            ServerEvent::GeneralSuccess { success: true } => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(event: ServerEvent) -> CoordinatorError {
    match event {
        ServerEvent::NotFound => CoordinatorError::NotFound,
        ServerEvent::AlreadyCompleted => CoordinatorError::AlreadyCompleted,
        other => CoordinatorError::UnexpectedResponse(format!("{other:?}")),
    }
}

#[async_trait::async_trait]
impl Coordinator for Client {
    async fn send_heartbeat(
        &self,
        task_token: &TaskToken,
        activity_id: &ActivityId,
        details: &str,
    ) -> Result<Heartbeat, CoordinatorError> {
        let event = WorkerEvent::Heartbeat {
            task_token: task_token.clone(),
            activity_id: activity_id.clone(),
            details: details.to_string(),
        };

        match self.send_event(&event).await? {
            ServerEvent::Heartbeat(heartbeat) => Ok(heartbeat),
            other => Err(unexpected(other)),
        }
    }

    async fn report_progress(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        percent_complete: u8,
    ) -> Result<(), CoordinatorError> {
        let event = WorkerEvent::ReportProgress {
            workflow_id: workflow_id.clone(),
            activity_id: activity_id.clone(),
            percent_complete,
        };
        self.expect_success(&event).await
    }

    async fn report_success(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        result: serde_json::Value,
    ) -> Result<(), CoordinatorError> {
        self.complete_activity(workflow_id, activity_id, CompletionOutcome::Success { result })
            .await
    }

    async fn report_failure(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError> {
        let outcome = CompletionOutcome::Failure {
            reason: reason.to_string(),
            details: details.to_string(),
        };
        self.complete_activity(workflow_id, activity_id, outcome).await
    }

    async fn report_cancelled(
        &self,
        workflow_id: &WorkflowId,
        activity_id: &ActivityId,
        reason: &str,
        details: &str,
    ) -> Result<(), CoordinatorError> {
        let outcome = CompletionOutcome::Cancelled {
            reason: reason.to_string(),
            details: details.to_string(),
        };
        self.complete_activity(workflow_id, activity_id, outcome).await
    }
}
