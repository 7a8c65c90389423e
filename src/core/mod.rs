pub mod activity;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod heartbeat;
pub mod outcome;
pub mod progress;
pub mod supervisor;
pub mod worker_events;

pub use activity::{
    ActivityContext, ActivityError, ActivityFn, ActivityId, ExecutionRequest, TaskToken,
    WorkflowId,
};
pub use client::Client;
pub use config::{ConfigError, SupervisorConfig};
pub use coordinator::{Coordinator, CoordinatorError, Heartbeat};
pub use error::SupervisorError;
pub use outcome::{CompletionOutcome, CANCELLED_REASON, COMPLETED_MESSAGE, TIMEOUT_ERROR_MESSAGE};
pub use progress::ProgressSender;
pub use supervisor::Supervisor;
