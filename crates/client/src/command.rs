//! Job commands: complete, fail and throw-error

use std::sync::Arc;
use std::time::Duration;

use jobflow_protocol::{document_to_wire, proto};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::gateway::Gateway;
use crate::reliability::RetryStrategy;

/// Creates commands that act on an activated job
///
/// Handlers receive an implementation of this trait alongside each job.
pub trait JobClient: Send + Sync {
    fn new_complete_job_command(&self, job_key: i64) -> CompleteJobCommand;

    fn new_fail_command(&self, job_key: i64) -> FailJobCommand;

    fn new_throw_error_command(&self, job_key: i64) -> ThrowErrorCommand;
}

/// Shared by every command created from the same client
#[derive(Clone)]
pub(crate) struct CommandContext {
    gateway: Arc<dyn Gateway>,
    retry: Arc<RetryStrategy>,
    cancel: CancellationToken,
}

impl CommandContext {
    pub(crate) fn new(gateway: Arc<dyn Gateway>, retry: Arc<RetryStrategy>) -> Self {
        Self {
            gateway,
            retry,
            cancel: CancellationToken::new(),
        }
    }
}

/// Completes a job, optionally setting process variables
#[must_use = "commands do nothing unless sent"]
pub struct CompleteJobCommand {
    ctx: CommandContext,
    job_key: i64,
    variables: Option<serde_json::Value>,
}

impl CompleteJobCommand {
    pub(crate) fn new(ctx: CommandContext, job_key: i64) -> Self {
        Self {
            ctx,
            job_key,
            variables: None,
        }
    }

    /// Variables to merge into the process instance
    pub fn variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Abort `send_with_retry` when the token fires
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx.cancel = token;
        self
    }

    fn request(&self) -> proto::CompleteJobRequest {
        proto::CompleteJobRequest {
            job_key: self.job_key,
            variables: document_to_wire(self.variables.as_ref()),
        }
    }

    /// Send the command once
    #[instrument(skip(self), fields(job_key = self.job_key))]
    pub async fn send(self) -> Result<()> {
        self.ctx.gateway.complete_job(self.request()).await
    }

    /// Send the command, retrying transient gateway errors
    #[instrument(skip(self), fields(job_key = self.job_key))]
    pub async fn send_with_retry(self) -> Result<()> {
        let request = self.request();
        let gateway = &self.ctx.gateway;
        self.ctx
            .retry
            .do_with_retry(|| gateway.complete_job(request.clone()), &self.ctx.cancel)
            .await
    }
}

/// Marks a job as failed
///
/// The job is retried by the engine while `retries` stays above zero;
/// otherwise an incident is raised.
#[must_use = "commands do nothing unless sent"]
pub struct FailJobCommand {
    ctx: CommandContext,
    job_key: i64,
    retries: i32,
    error_message: String,
    retry_backoff: Duration,
    variables: Option<serde_json::Value>,
}

impl FailJobCommand {
    pub(crate) fn new(ctx: CommandContext, job_key: i64) -> Self {
        Self {
            ctx,
            job_key,
            retries: 0,
            error_message: String::new(),
            retry_backoff: Duration::ZERO,
            variables: None,
        }
    }

    /// Retries left for the job after this failure
    pub fn retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// How long the engine waits before the job can be activated again
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Abort `send_with_retry` when the token fires
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx.cancel = token;
        self
    }

    fn request(&self) -> proto::FailJobRequest {
        proto::FailJobRequest {
            job_key: self.job_key,
            retries: self.retries,
            error_message: self.error_message.clone(),
            retry_back_off: i64::try_from(self.retry_backoff.as_millis()).unwrap_or(i64::MAX),
            variables: document_to_wire(self.variables.as_ref()),
        }
    }

    /// Send the command once
    #[instrument(skip(self), fields(job_key = self.job_key, retries = self.retries))]
    pub async fn send(self) -> Result<()> {
        self.ctx.gateway.fail_job(self.request()).await
    }

    /// Send the command, retrying transient gateway errors
    #[instrument(skip(self), fields(job_key = self.job_key, retries = self.retries))]
    pub async fn send_with_retry(self) -> Result<()> {
        let request = self.request();
        let gateway = &self.ctx.gateway;
        self.ctx
            .retry
            .do_with_retry(|| gateway.fail_job(request.clone()), &self.ctx.cancel)
            .await
    }
}

/// Reports a business error that can be caught by an error event in the process
#[must_use = "commands do nothing unless sent"]
pub struct ThrowErrorCommand {
    ctx: CommandContext,
    job_key: i64,
    error_code: String,
    error_message: String,
    variables: Option<serde_json::Value>,
}

impl ThrowErrorCommand {
    pub(crate) fn new(ctx: CommandContext, job_key: i64) -> Self {
        Self {
            ctx,
            job_key,
            error_code: String::new(),
            error_message: String::new(),
            variables: None,
        }
    }

    /// Error code matched against error catch events (required)
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Abort `send_with_retry` when the token fires
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx.cancel = token;
        self
    }

    fn request(&self) -> Result<proto::ThrowErrorRequest> {
        if self.error_code.is_empty() {
            return Err(ClientError::config("throw error command requires an error code"));
        }

        Ok(proto::ThrowErrorRequest {
            job_key: self.job_key,
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
            variables: document_to_wire(self.variables.as_ref()),
        })
    }

    /// Send the command once
    #[instrument(skip(self), fields(job_key = self.job_key, error_code = %self.error_code))]
    pub async fn send(self) -> Result<()> {
        let request = self.request()?;
        self.ctx.gateway.throw_error(request).await
    }

    /// Send the command, retrying transient gateway errors
    #[instrument(skip(self), fields(job_key = self.job_key, error_code = %self.error_code))]
    pub async fn send_with_retry(self) -> Result<()> {
        let request = self.request()?;
        let gateway = &self.ctx.gateway;
        self.ctx
            .retry
            .do_with_retry(|| gateway.throw_error(request.clone()), &self.ctx.cancel)
            .await
    }
}
