use jamesporal_worker::{example, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    example::run().await
}
