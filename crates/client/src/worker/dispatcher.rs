//! Job dispatch and handler execution
//!
//! Drains the job queue with bounded parallelism. A handler slot is acquired
//! before a job is dequeued, so with one slot jobs are handled strictly in
//! activation order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, trace};

use super::config::JobWorkerConfig;
use super::handler::{JobClientRef, JobHandler};
use super::job_client::TrackingJobClient;
use super::queue::JobQueue;
use crate::command::JobClient;
use crate::job::Job;

/// Fail-job message for a handler error
///
/// Embeds the worker name, job type and the error chain.
pub fn failure_message(worker: &str, job_type: &str, error: &anyhow::Error) -> String {
    format!(
        "Job worker '{worker}' tried to handle job of type '{job_type}', but the handler failed: {error:#}"
    )
}

/// Per-job state shared by every handler task of one worker
struct DispatchContext {
    queue: Arc<JobQueue>,
    handler: JobHandler,
    job_client: Arc<dyn JobClient>,
    worker_name: String,
    job_type: String,
    auto_completion: bool,
}

/// Consumer side of the job queue
pub struct JobDispatcher {
    ctx: Arc<DispatchContext>,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl JobDispatcher {
    pub fn new(
        config: &JobWorkerConfig,
        queue: Arc<JobQueue>,
        handler: JobHandler,
        job_client: Arc<dyn JobClient>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        let ctx = DispatchContext {
            queue,
            handler,
            job_client,
            worker_name: config.worker_name.clone(),
            job_type: config.job_type.clone(),
            auto_completion: config.auto_completion,
        };

        Self {
            ctx: Arc::new(ctx),
            slots: Arc::new(Semaphore::new(usize::from(config.handler_threads.max(1)))),
            tracker,
            cancel,
        }
    }

    /// Dispatch jobs until cancelled
    ///
    /// Handlers still running when the loop exits keep their slot and are
    /// tracked by the task tracker.
    #[instrument(skip(self), fields(job_type = %self.ctx.job_type, worker = %self.ctx.worker_name))]
    pub async fn run(self) {
        debug!("Dispatch loop started");

        loop {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(job) = self.ctx.queue.next(&self.cancel).await else {
                break;
            };

            trace!(job_key = job.key(), "Dispatching job");
            let ctx = Arc::clone(&self.ctx);
            self.tracker.spawn(async move {
                ctx.handle(job).await;
                drop(permit);
            });
        }

        debug!("Dispatch loop exited");
    }
}

impl DispatchContext {
    async fn handle(&self, job: Job) {
        let job_key = job.key();
        let retries = job.retries();

        let tracking = Arc::new(TrackingJobClient::new(Arc::clone(&self.job_client)));
        let client: JobClientRef = tracking.clone();

        match self.handler.invoke(client, job).await {
            Ok(()) => {
                if self.auto_completion && !tracking.was_used() {
                    self.auto_complete(job_key).await;
                }
            }
            Err(e) => self.report_failure(job_key, retries, e).await,
        }

        self.queue.mark_handled();
    }

    async fn auto_complete(&self, job_key: i64) {
        trace!(job_key, "Auto-completing job");
        if let Err(e) = self.job_client.new_complete_job_command(job_key).send().await {
            error!(job_key, job_type = %self.job_type, error = %e, "Failed to auto-complete job");
        }
    }

    async fn report_failure(&self, job_key: i64, retries: i32, failure: anyhow::Error) {
        let detail = format!("{failure:#}");
        error!(
            job_key,
            job_type = %self.job_type,
            worker = %self.worker_name,
            error = %detail,
            "Job handler failed"
        );

        let message = failure_message(&self.worker_name, &self.job_type, &failure);
        let result = self
            .job_client
            .new_fail_command(job_key)
            .retries(retries - 1)
            .error_message(message)
            .send()
            .await;

        if let Err(e) = result {
            error!(
                job_key,
                job_type = %self.job_type,
                error = %e,
                "Failed to report job failure"
            );
        }
    }
}
