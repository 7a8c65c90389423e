use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::core::activity::{ActivityId, TaskToken, WorkflowId};
use crate::core::coordinator::Heartbeat;
use crate::core::outcome::CompletionOutcome;
use crate::core::worker_events::ActivityStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub workflow_id: WorkflowId,
    pub activity_id: ActivityId,
}

#[derive(Debug, Clone)]
pub struct HeartbeatEvent {
    pub details: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub task_token: TaskToken,
    pub cancel_requested: bool,
    pub heartbeats: Vec<HeartbeatEvent>,
    pub progress: Vec<u8>,
    pub outcome: Option<CompletionOutcome>,
    pub registered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionResult {
    Recorded,
    AlreadyCompleted,
    NotFound,
}

#[derive(Clone)]
pub struct Db {
    pub activities: Arc<DashMap<ActivityKey, ActivityRecord>>,
    pub task_tokens: Arc<DashMap<TaskToken, ActivityKey>>,
}

impl Db {
    pub fn new() -> Self {
        Self {
            activities: Arc::new(DashMap::new()),
            task_tokens: Arc::new(DashMap::new()),
        }
    }

    /// Returns the activity's task token, issuing one on first registration.
    pub async fn register_activity(&self, key: ActivityKey) -> TaskToken {
        let record = self.activities.entry(key.clone()).or_insert_with(|| ActivityRecord {
            task_token: TaskToken::new(uuid::Uuid::new_v4().to_string()),
            cancel_requested: false,
            heartbeats: Vec::new(),
            progress: Vec::new(),
            outcome: None,
            registered_at: Utc::now(),
            completed_at: None,
        });
        let task_token = record.task_token.clone();
        drop(record);

        self.task_tokens.insert(task_token.clone(), key);
        task_token
    }

    pub async fn record_heartbeat(
        &self,
        task_token: &TaskToken,
        activity_id: &ActivityId,
        details: String,
    ) -> Option<Heartbeat> {
        let key = self.task_tokens.get(task_token)?.clone();
        if &key.activity_id != activity_id {
            return None;
        }

        let mut record = self.activities.get_mut(&key)?;
        record.heartbeats.push(HeartbeatEvent {
            details: details.clone(),
            received_at: Utc::now(),
        });

        Some(Heartbeat {
            activity_id: key.activity_id,
            cancelled: record.cancel_requested,
            details: Some(details),
        })
    }

    pub async fn record_progress(&self, key: &ActivityKey, percent_complete: u8) -> bool {
        match self.activities.get_mut(key) {
            Some(mut record) => {
                record.progress.push(percent_complete);
                true
            }
            None => false,
        }
    }

    pub async fn complete_activity(
        &self,
        key: &ActivityKey,
        outcome: CompletionOutcome,
    ) -> CompletionResult {
        let Some(mut record) = self.activities.get_mut(key) else {
            return CompletionResult::NotFound;
        };
        if record.outcome.is_some() {
            return CompletionResult::AlreadyCompleted;
        }

        record.outcome = Some(outcome);
        record.completed_at = Some(Utc::now());
        CompletionResult::Recorded
    }

    pub async fn request_cancellation(&self, task_token: &TaskToken) -> bool {
        let Some(key) = self.task_tokens.get(task_token).map(|key| key.clone()) else {
            return false;
        };
        match self.activities.get_mut(&key) {
            Some(mut record) => {
                record.cancel_requested = true;
                true
            }
            None => false,
        }
    }

    pub async fn describe_activity(&self, key: &ActivityKey) -> Option<ActivityStatus> {
        let record = self.activities.get(key)?;
        Some(ActivityStatus {
            workflow_id: key.workflow_id.clone(),
            activity_id: key.activity_id.clone(),
            cancel_requested: record.cancel_requested,
            heartbeat_count: record.heartbeats.len(),
            last_heartbeat_details: record.heartbeats.last().map(|hb| hb.details.clone()),
            progress: record.progress.clone(),
            outcome: record.outcome.clone(),
        })
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ActivityKey {
        ActivityKey {
            workflow_id: WorkflowId::from("wf"),
            activity_id: ActivityId::from("act"),
        }
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let db = Db::new();
        let first = db.register_activity(key()).await;
        let second = db.register_activity(key()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn heartbeat_reflects_cancellation_request() {
        let db = Db::new();
        let token = db.register_activity(key()).await;
        let activity_id = ActivityId::from("act");

        let hb = db
            .record_heartbeat(&token, &activity_id, "running".to_string())
            .await
            .unwrap();
        assert!(!hb.cancelled);

        assert!(db.request_cancellation(&token).await);
        let hb = db
            .record_heartbeat(&token, &activity_id, "50% complete".to_string())
            .await
            .unwrap();
        assert!(hb.cancelled);

        let status = db.describe_activity(&key()).await.unwrap();
        assert_eq!(status.heartbeat_count, 2);
        assert_eq!(status.last_heartbeat_details.as_deref(), Some("50% complete"));
    }

    #[tokio::test]
    async fn heartbeat_for_other_activity_is_unknown() {
        let db = Db::new();
        let token = db.register_activity(key()).await;
        let other = ActivityId::from("other");
        assert!(db
            .record_heartbeat(&token, &other, "running".to_string())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn only_first_completion_is_recorded() {
        let db = Db::new();
        db.register_activity(key()).await;

        let first = db
            .complete_activity(&key(), CompletionOutcome::cancelled("completed"))
            .await;
        let second = db
            .complete_activity(
                &key(),
                CompletionOutcome::Success {
                    result: serde_json::Value::Null,
                },
            )
            .await;

        assert_eq!(first, CompletionResult::Recorded);
        assert_eq!(second, CompletionResult::AlreadyCompleted);
        let status = db.describe_activity(&key()).await.unwrap();
        assert_eq!(status.outcome, Some(CompletionOutcome::cancelled("completed")));
    }
}
