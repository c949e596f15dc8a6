//! Job polling loop
//!
//! Refills the job queue from the gateway whenever occupancy drops below the
//! backpressure threshold, and otherwise idles until a job is handled or the
//! poll interval elapses.

use std::sync::Arc;
use std::time::Duration;

use jobflow_protocol::proto;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};

use super::activation::JobActivationClient;
use super::config::JobWorkerConfig;
use super::queue::JobQueue;
use crate::error::{ClientError, Result};

/// Outcome of one poller step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Queue above threshold, waited for capacity
    Idle,
    /// Issued an activation call
    Polling,
    /// Cancellation observed; the loop must exit
    Stopped,
}

/// Single-threaded producer feeding the job queue
///
/// The activation request is owned by the poller and only its
/// `max_jobs_to_activate` field changes between cycles.
pub struct JobPoller {
    activation: JobActivationClient,
    request: proto::ActivateJobsRequest,
    queue: Arc<JobQueue>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl JobPoller {
    pub fn new(
        activation: JobActivationClient,
        config: &JobWorkerConfig,
        queue: Arc<JobQueue>,
        cancel: CancellationToken,
    ) -> Self {
        let request = proto::ActivateJobsRequest {
            r#type: config.job_type.clone(),
            worker: config.worker_name.clone(),
            timeout: saturating_millis(config.timeout),
            max_jobs_to_activate: 0,
            fetch_variable: config.fetch_variables.clone(),
            request_timeout: saturating_millis(config.polling_timeout),
            tenant_ids: config.tenant_ids.clone(),
        };

        Self {
            activation,
            request,
            queue,
            poll_interval: config.poll_interval,
            cancel,
        }
    }

    /// Poll until cancelled
    #[instrument(skip(self), fields(job_type = %self.request.r#type, worker = %self.request.worker))]
    pub async fn run(mut self) {
        debug!("Poll loop started");
        while self.step().await != PollerState::Stopped {}
        debug!("Poll loop exited");
    }

    /// Run one cycle: poll if below threshold, otherwise wait for capacity
    pub async fn step(&mut self) -> PollerState {
        if self.cancel.is_cancelled() {
            return PollerState::Stopped;
        }

        if !self.queue.backpressure().should_activate() {
            trace!(occupancy = self.queue.occupancy(), "Queue above threshold, waiting");
            let cancelled = self
                .queue
                .wait_for_capacity(self.poll_interval, &self.cancel)
                .await;
            return if cancelled {
                PollerState::Stopped
            } else {
                PollerState::Idle
            };
        }

        match self.poll_once().await {
            Ok(count) => {
                debug!(count, occupancy = self.queue.occupancy(), "Poll cycle finished");
                PollerState::Polling
            }
            Err(ClientError::Cancelled) => PollerState::Stopped,
            Err(e) if e.is_expected_poll_end() => {
                debug!(error = %e, "Activation ended without jobs, polling again");
                PollerState::Polling
            }
            Err(e) => {
                error!(error = %e, "Failed to activate jobs");
                tokio::select! {
                    _ = self.cancel.cancelled() => PollerState::Stopped,
                    _ = tokio::time::sleep(self.poll_interval) => PollerState::Polling,
                }
            }
        }
    }

    /// Issue one activation call sized to refill the queue
    async fn poll_once(&mut self) -> Result<usize> {
        let wanted = self.queue.backpressure().jobs_to_activate();
        self.request.max_jobs_to_activate = i32::try_from(wanted).unwrap_or(i32::MAX);

        let queue = &self.queue;
        self.activation
            .activate(
                &self.request,
                |jobs| {
                    for job in jobs {
                        queue.push(job);
                    }
                },
                None,
                &self.cancel,
            )
            .await
    }

    pub fn request(&self) -> &proto::ActivateJobsRequest {
        &self.request
    }
}

fn saturating_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
