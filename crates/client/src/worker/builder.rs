//! Job worker builder and lifecycle

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::activation::JobActivationClient;
use super::config::JobWorkerConfig;
use super::dispatcher::JobDispatcher;
use super::handler::{HandlerResult, JobClientRef, JobHandler};
use super::poller::JobPoller;
use super::queue::JobQueue;
use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::job::Job;

/// Fluent configuration for a [`JobWorker`]
///
/// # Example
///
/// ```ignore
/// let worker = client
///     .new_worker()
///     .job_type("payment-service")
///     .max_jobs_active(10)
///     .auto_completion(true)
///     .handler(|_client, job| async move {
///         tracing::info!(job_key = job.key(), "charging card");
///         Ok(())
///     })
///     .open()?;
///
/// // ... later
/// worker.close().await;
/// ```
#[must_use = "a worker does nothing until opened"]
pub struct JobWorkerBuilder {
    client: Client,
    config: JobWorkerConfig,
    handler: Option<JobHandler>,
}

impl JobWorkerBuilder {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            config: JobWorkerConfig::default(),
            handler: None,
        }
    }

    /// Replace every setting at once, keeping the handler
    pub fn config(mut self, config: JobWorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Job type to subscribe to (required)
    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.config.job_type = job_type.into();
        self
    }

    /// Async handler invoked for each job
    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(JobClientRef, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler = Some(JobHandler::from_async(handler));
        self
    }

    /// Blocking handler invoked for each job on the blocking thread pool
    pub fn blocking_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(JobClientRef, Job) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler = Some(JobHandler::from_blocking(handler));
        self
    }

    pub fn max_jobs_active(mut self, max: usize) -> Self {
        self.config.max_jobs_active = max;
        self
    }

    /// Worker name reported to the gateway
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.worker_name = name.into();
        self
    }

    /// Exclusive assignment timeout of activated jobs
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Server-side long-poll timeout
    pub fn polling_timeout(mut self, timeout: Duration) -> Self {
        self.config.polling_timeout = timeout;
        self
    }

    pub fn fetch_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fetch_variables = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn tenant_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tenant_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_completion(mut self, enabled: bool) -> Self {
        self.config.auto_completion = enabled;
        self
    }

    /// Number of handlers allowed to run concurrently
    pub fn handler_threads(mut self, threads: u8) -> Self {
        self.config.handler_threads = threads;
        self
    }

    /// Upper bound on waiting for in-flight handlers when closing
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Validate the configuration and start polling and dispatching
    ///
    /// Must be called within a Tokio runtime. Nothing is started when
    /// validation fails.
    #[instrument(skip(self), fields(job_type = %self.config.job_type, worker = %self.config.worker_name))]
    pub fn open(self) -> Result<JobWorker> {
        self.config.validate()?;
        let handler = self
            .handler
            .ok_or_else(|| ClientError::config("a job handler is required"))?;

        let config = self.config;
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let queue = Arc::new(JobQueue::new(config.max_jobs_active));

        let poller = JobPoller::new(
            JobActivationClient::new(self.client.gateway()),
            &config,
            Arc::clone(&queue),
            cancel.clone(),
        );
        let dispatcher = JobDispatcher::new(
            &config,
            Arc::clone(&queue),
            handler,
            Arc::new(self.client),
            tracker.clone(),
            cancel.clone(),
        );

        let loops = vec![tokio::spawn(poller.run()), tokio::spawn(dispatcher.run())];

        info!(
            max_jobs_active = config.max_jobs_active,
            handler_threads = config.handler_threads,
            auto_completion = config.auto_completion,
            "Job worker opened"
        );

        Ok(JobWorker {
            config,
            queue,
            cancel,
            tracker,
            loops: Mutex::new(loops),
            closed: AtomicBool::new(false),
        })
    }
}

/// A running job worker
///
/// Open until [`close`](JobWorker::close) is called. Dropping an open worker
/// stops polling and dispatching without waiting for in-flight handlers.
pub struct JobWorker {
    config: JobWorkerConfig,
    queue: Arc<JobQueue>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    loops: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl JobWorker {
    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Jobs queued or being handled
    pub fn occupancy(&self) -> usize {
        self.queue.occupancy()
    }

    pub fn config(&self) -> &JobWorkerConfig {
        &self.config
    }

    /// Stop polling and dispatching, then wait for in-flight handlers
    ///
    /// Handlers are never aborted; waiting is bounded by the shutdown
    /// timeout. Calling this again is a no-op.
    #[instrument(skip(self), fields(job_type = %self.config.job_type, worker = %self.config.worker_name))]
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Closing job worker");
        self.cancel.cancel();

        let loops = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker loop ended abnormally");
            }
        }

        self.tracker.close();
        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => debug!("All handlers finished"),
            Err(_) => warn!(
                remaining = self.tracker.len(),
                "Shutdown timeout reached with handlers still running"
            ),
        }

        info!("Job worker closed");
    }
}

impl Drop for JobWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for JobWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorker")
            .field("job_type", &self.config.job_type)
            .field("worker_name", &self.config.worker_name)
            .field("occupancy", &self.occupancy())
            .field("closed", &self.is_closed())
            .finish()
    }
}
