use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::progress::ProgressSender;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct WorkflowId(String);
impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        WorkflowId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        WorkflowId(value.to_string())
    }
}
impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ActivityId(String);
impl ActivityId {
    pub fn new(id: impl Into<String>) -> Self {
        ActivityId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for ActivityId {
    fn from(value: &str) -> Self {
        ActivityId(value.to_string())
    }
}
impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque credential issued by the coordinator for one activity execution.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskToken(String);
impl TaskToken {
    pub fn new(token: impl Into<String>) -> Self {
        TaskToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for TaskToken {
    fn from(value: &str) -> Self {
        TaskToken(value.to_string())
    }
}
impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One activity invocation handed to the supervisor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub workflow_id: WorkflowId,
    pub activity_id: ActivityId,
    pub task_token: TaskToken,
}

impl ExecutionRequest {
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        activity_id: impl Into<ActivityId>,
        task_token: impl Into<TaskToken>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            activity_id: activity_id.into(),
            task_token: task_token.into(),
        }
    }
}

/// Error returned by an activity function.
///
/// `reason` is the summary the coordinator records; `details` is an optional
/// longer explanation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ActivityError {
    pub reason: String,
    pub details: Option<String>,
}

impl ActivityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<String> for ActivityError {
    fn from(reason: String) -> Self {
        ActivityError::new(reason)
    }
}

impl From<&str> for ActivityError {
    fn from(reason: &str) -> Self {
        ActivityError::new(reason)
    }
}

/// The view of an execution handed to the activity function.
///
/// It can observe cancellation but never trigger it.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    workflow_id: WorkflowId,
    activity_id: ActivityId,
    cancel: CancellationToken,
}

impl ActivityContext {
    pub(crate) fn new(
        workflow_id: WorkflowId,
        activity_id: ActivityId,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workflow_id,
            activity_id,
            cancel,
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn activity_id(&self) -> &ActivityId {
        &self.activity_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation has been requested for this execution.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// A unit of work the supervisor can run.
///
/// Implemented for every `FnOnce(ActivityContext, ProgressSender) -> impl Future`
/// so closures and `async fn`s can be passed directly.
pub trait ActivityFn<T>: Send + 'static {
    type Future: Future<Output = Result<T, ActivityError>> + Send + 'static;

    fn call(self, context: ActivityContext, progress: ProgressSender) -> Self::Future;
}

impl<T, F, Fut> ActivityFn<T> for F
where
    F: FnOnce(ActivityContext, ProgressSender) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, ActivityError>> + Send + 'static,
{
    type Future = Fut;

    fn call(self, context: ActivityContext, progress: ProgressSender) -> Fut {
        self(context, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_error_displays_reason_only() {
        let err = ActivityError::new("disk full").with_details("wrote 10 of 12 blocks");
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.details.as_deref(), Some("wrote 10 of 12 blocks"));
    }

    #[test]
    fn identifiers_serialize_transparently() {
        let request = ExecutionRequest::new("wf-1", "act-1", "token-1");
        assert_eq!(
            serde_json::to_string(&request.task_token).unwrap(),
            "\"token-1\""
        );
        assert_eq!(request.workflow_id.as_str(), "wf-1");
    }

    #[test]
    fn context_follows_its_token() {
        let token = CancellationToken::new();
        let ctx = ActivityContext::new("wf".into(), "act".into(), token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
