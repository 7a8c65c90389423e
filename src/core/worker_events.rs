use serde::{Deserialize, Serialize};

use crate::core::{
    activity::{ActivityId, TaskToken, WorkflowId},
    coordinator::Heartbeat,
    outcome::CompletionOutcome,
};

#[derive(Serialize, Deserialize, Debug)]
pub enum WorkerEvent {
    RegisterActivity {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
    },
    Heartbeat {
        task_token: TaskToken,
        activity_id: ActivityId,
        details: String,
    },
    ReportProgress {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
        percent_complete: u8,
    },
    CompleteActivity {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
        outcome: CompletionOutcome,
    },
    DescribeActivity {
        workflow_id: WorkflowId,
        activity_id: ActivityId,
    },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CancelActivityPayload {
    pub task_token: TaskToken,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivityStatus {
    pub workflow_id: WorkflowId,
    pub activity_id: ActivityId,
    pub cancel_requested: bool,
    pub heartbeat_count: usize,
    pub last_heartbeat_details: Option<String>,
    pub progress: Vec<u8>,
    pub outcome: Option<CompletionOutcome>,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum ServerEvent {
    ActivityRegistered { task_token: TaskToken },
    Heartbeat(Heartbeat),
    ActivityStatus(ActivityStatus),
    GeneralSuccess { success: bool },
    AlreadyCompleted,
    NotFound,
}
