use anyhow::{Context, Result};
use jobflow_client::{Client, ClientConfig, JobWorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise LOG_LEVEL applies to this crate
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(format!("jobflow_client={level},jobflow_worker={level}"))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("jobflow-worker starting...");

    let client_config = ClientConfig::from_env();
    let mut worker_config = JobWorkerConfig::from_env();
    // Nothing else completes jobs in this binary
    worker_config.auto_completion = true;

    tracing::info!(
        gateway_address = %client_config.gateway_address,
        job_type = %worker_config.job_type,
        worker = %worker_config.worker_name,
        max_jobs_active = worker_config.max_jobs_active,
        "Connecting to gateway"
    );

    let client = Client::connect(&client_config)
        .await
        .context("Failed to connect to gateway")?;

    let worker = client
        .new_worker()
        .config(worker_config)
        .handler(|_client, job| async move {
            tracing::info!(
                job_key = job.key(),
                job_type = %job.job_type(),
                retries = job.retries(),
                variables = %job.variables(),
                "Handling job"
            );
            Ok(())
        })
        .open()
        .context("Failed to open job worker")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    worker.close().await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
