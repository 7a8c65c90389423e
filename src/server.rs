//! In-memory development coordinator.

use crate::core::worker_events::{CancelActivityPayload, ServerEvent, WorkerEvent};
use crate::inmemory_db::{ActivityKey, CompletionResult, Db};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info};

pub struct Server {
    state: ServerState,
}

#[derive(Clone)]
pub struct ServerState {
    db: Db,
}

async fn handle_cancel_activity(
    State(state): State<ServerState>,
    Json(payload): Json<CancelActivityPayload>,
) -> impl IntoResponse {
    if state.db.request_cancellation(&payload.task_token).await {
        info!(task_token = %payload.task_token, "cancellation requested");
        return Json(ServerEvent::GeneralSuccess { success: true });
    }

    Json(ServerEvent::NotFound)
}

async fn handle_worker_event(
    State(state): State<ServerState>,
    Json(event): Json<WorkerEvent>,
) -> impl IntoResponse {
    let db = state.db;
    match event {
        WorkerEvent::RegisterActivity {
            workflow_id,
            activity_id,
        } => {
            let task_token = db
                .register_activity(ActivityKey {
                    workflow_id,
                    activity_id,
                })
                .await;
            return Json(ServerEvent::ActivityRegistered { task_token });
        }
        WorkerEvent::Heartbeat {
            task_token,
            activity_id,
            details,
        } => {
            debug!(activity_id = %activity_id, details = %details, "heartbeat");
            return match db.record_heartbeat(&task_token, &activity_id, details).await {
                Some(heartbeat) => Json(ServerEvent::Heartbeat(heartbeat)),
                None => Json(ServerEvent::NotFound),
            };
        }
        WorkerEvent::ReportProgress {
            workflow_id,
            activity_id,
            percent_complete,
        } => {
            let key = ActivityKey {
                workflow_id,
                activity_id,
            };
            if !db.record_progress(&key, percent_complete).await {
                return Json(ServerEvent::NotFound);
            }
        }
        WorkerEvent::CompleteActivity {
            workflow_id,
            activity_id,
            outcome,
        } => {
            info!(
                workflow_id = %workflow_id,
                activity_id = %activity_id,
                outcome = outcome.kind(),
                "activity completed"
            );
            let key = ActivityKey {
                workflow_id,
                activity_id,
            };
            match db.complete_activity(&key, outcome).await {
                CompletionResult::Recorded => {}
                CompletionResult::AlreadyCompleted => return Json(ServerEvent::AlreadyCompleted),
                CompletionResult::NotFound => return Json(ServerEvent::NotFound),
            }
        }
        WorkerEvent::DescribeActivity {
            workflow_id,
            activity_id,
        } => {
            let key = ActivityKey {
                workflow_id,
                activity_id,
            };
            return match db.describe_activity(&key).await {
                Some(status) => Json(ServerEvent::ActivityStatus(status)),
                None => Json(ServerEvent::NotFound),
            };
        }
    };

    Json(ServerEvent::GeneralSuccess { success: true })
}

impl Server {
    pub fn new() -> Self {
        Self {
            state: ServerState { db: Db::new() },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/worker_event", axum::routing::post(handle_worker_event))
            .route(
                "/cancel_activity",
                axum::routing::post(handle_cancel_activity),
            )
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "starting coordinator");
        axum::serve(listener, self.router()).await
    }

    pub async fn run(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
