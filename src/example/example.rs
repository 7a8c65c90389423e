use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{
    self, ActivityContext, ActivityError, ActivityId, ExecutionRequest, ProgressSender,
    SupervisorConfig, WorkflowId,
};
use crate::server::Server;

const COORDINATOR_ADDR: &str = "localhost:8080";
const COORDINATOR_URL: &str = "http://localhost:8080";

#[derive(Serialize)]
struct Summary {
    processed: u32,
}

async fn process_batch(
    _ctx: ActivityContext,
    progress: ProgressSender,
) -> Result<Summary, ActivityError> {
    for step in 1..=4u8 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        progress.report(step * 25);
        // repeated values are collapsed before they reach the coordinator
        progress.report(step * 25);
    }
    Ok(Summary { processed: 4 })
}

async fn fail_validation(
    _ctx: ActivityContext,
    _progress: ProgressSender,
) -> Result<(), ActivityError> {
    Err(ActivityError::new("Invalid input").with_details("expected a number, got \"three\""))
}

async fn wait_for_cancellation(
    ctx: ActivityContext,
    progress: ProgressSender,
) -> Result<(), ActivityError> {
    progress.report(10);
    ctx.cancelled().await;
    Err(ActivityError::new("stopped after cancellation"))
}

pub async fn run() -> anyhow::Result<()> {
    println!("-------- Setting up -----");

    let server = Server::new();
    tokio::task::spawn(async move { server.run(COORDINATOR_ADDR).await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = core::Client::new(COORDINATOR_URL);
    let config = SupervisorConfig::from_env()?
        .with_heartbeat_interval(Duration::from_millis(100))
        .with_cancellation_timeout(Duration::from_secs(2));
    let supervisor = core::Supervisor::new(std::sync::Arc::new(client.clone()), config)?;
    let shutdown = CancellationToken::new();
    let workflow_id = WorkflowId::new(uuid::Uuid::new_v4().to_string());

    println!("-------- Running Activities -----");

    let batch = ActivityId::from("process-batch");
    let token = client
        .register_activity(workflow_id.clone(), batch.clone())
        .await
        .context("registering process-batch")?;
    supervisor
        .run(
            &shutdown,
            ExecutionRequest::new(workflow_id.clone(), batch.clone(), token),
            process_batch,
        )
        .await?;

    let validate = ActivityId::from("validate-input");
    let token = client
        .register_activity(workflow_id.clone(), validate.clone())
        .await
        .context("registering validate-input")?;
    supervisor
        .run(
            &shutdown,
            ExecutionRequest::new(workflow_id.clone(), validate.clone(), token),
            fail_validation,
        )
        .await?;

    let long_running = ActivityId::from("long-running");
    let token = client
        .register_activity(workflow_id.clone(), long_running.clone())
        .await
        .context("registering long-running")?;
    {
        let client = client.clone();
        let token = token.clone();
        tokio::task::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            info!("requesting cancellation of long-running activity");
            client.request_cancellation(token).await
        });
    }
    supervisor
        .run(
            &shutdown,
            ExecutionRequest::new(workflow_id.clone(), long_running.clone(), token),
            wait_for_cancellation,
        )
        .await?;

    for activity_id in [batch, validate, long_running] {
        let status = client
            .describe_activity(workflow_id.clone(), activity_id.clone())
            .await?;
        println!("== {activity_id}: {status:?}");
    }

    Ok(())
}
