//! Top-level client facade

use std::sync::Arc;

use crate::command::{
    CommandContext, CompleteJobCommand, FailJobCommand, JobClient, ThrowErrorCommand,
};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::gateway::{Gateway, GrpcGateway};
use crate::reliability::RetryStrategy;
use crate::worker::JobWorkerBuilder;

/// Entry point for sending job commands and opening job workers
///
/// Cloning is cheap; clones share the gateway connection.
///
/// # Example
///
/// ```ignore
/// use jobflow_client::{Client, ClientConfig};
///
/// let client = Client::connect(&ClientConfig::from_env()).await?;
///
/// let worker = client
///     .new_worker()
///     .job_type("payment-service")
///     .handler(|client, job| async move {
///         client.new_complete_job_command(job.key()).send().await?;
///         Ok(())
///     })
///     .open()?;
/// ```
#[derive(Clone)]
pub struct Client {
    gateway: Arc<dyn Gateway>,
    retry: Arc<RetryStrategy>,
}

impl Client {
    /// Connect to the gateway over gRPC
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let gateway = GrpcGateway::connect(config).await?;
        Ok(Self::with_gateway(Arc::new(gateway))
            .with_retry_strategy(RetryStrategy::from_policy(&config.retry)))
    }

    /// Create a client over any gateway implementation
    pub fn with_gateway(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            retry: Arc::new(RetryStrategy::default()),
        }
    }

    /// Replace the strategy used by `send_with_retry`
    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    /// The underlying gateway
    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway)
    }

    /// Start configuring a job worker
    pub fn new_worker(&self) -> JobWorkerBuilder {
        JobWorkerBuilder::new(self.clone())
    }

    fn context(&self) -> CommandContext {
        CommandContext::new(Arc::clone(&self.gateway), Arc::clone(&self.retry))
    }
}

impl JobClient for Client {
    fn new_complete_job_command(&self, job_key: i64) -> CompleteJobCommand {
        CompleteJobCommand::new(self.context(), job_key)
    }

    fn new_fail_command(&self, job_key: i64) -> FailJobCommand {
        FailJobCommand::new(self.context(), job_key)
    }

    fn new_throw_error_command(&self, job_key: i64) -> ThrowErrorCommand {
        ThrowErrorCommand::new(self.context(), job_key)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
