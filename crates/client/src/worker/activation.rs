//! Streaming job activation

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use jobflow_protocol::proto;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Code;
use tracing::{trace, warn};

use crate::error::{ClientError, Result};
use crate::gateway::Gateway;
use crate::job::Job;

/// Smallest long-poll timeout used when computing the client deadline
const MIN_LONG_POLL: Duration = Duration::from_secs(10);

/// Margin added on top of the long-poll timeout
const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Client-side deadline for an activation call
///
/// Always strictly larger than the long-poll timeout in the request, so the
/// gateway answers (possibly with no jobs) before the client gives up.
pub fn activation_deadline(long_poll_timeout: Duration) -> Duration {
    long_poll_timeout.max(MIN_LONG_POLL) + DEADLINE_MARGIN
}

/// Issues activation calls and hands the resulting job batches to a callback
#[derive(Clone)]
pub struct JobActivationClient {
    gateway: Arc<dyn Gateway>,
}

impl JobActivationClient {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Run one activation call to completion
    ///
    /// `on_batch` is invoked once per streamed response with the jobs it
    /// carried. Jobs that fail conversion are logged and skipped. Returns the
    /// number of jobs handed to `on_batch` once the gateway ends the stream.
    ///
    /// `deadline` defaults to [`activation_deadline`] of the request's
    /// long-poll timeout. Expiry surfaces as a `DeadlineExceeded` RPC error,
    /// cancellation as [`ClientError::Cancelled`].
    pub async fn activate<F>(
        &self,
        request: &proto::ActivateJobsRequest,
        mut on_batch: F,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<usize>
    where
        F: FnMut(Vec<Job>),
    {
        let long_poll = Duration::from_millis(request.request_timeout.max(0) as u64);
        let deadline = deadline.unwrap_or_else(|| activation_deadline(long_poll));
        let expires_at = Instant::now() + deadline;

        let open = tokio::time::timeout_at(
            expires_at,
            self.gateway.activate_jobs(request.clone(), deadline),
        );
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            opened = open => opened.map_err(|_| deadline_exceeded(deadline))??,
        };

        let mut activated = 0;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                next = tokio::time::timeout_at(expires_at, stream.next()) => {
                    next.map_err(|_| deadline_exceeded(deadline))?
                }
            };

            let response = match next {
                Some(response) => response?,
                None => break,
            };

            let jobs: Vec<Job> = response
                .jobs
                .into_iter()
                .filter_map(|job| {
                    let key = job.key;
                    Job::try_from(job)
                        .map_err(|e| warn!(job_key = key, error = %e, "Skipping malformed job"))
                        .ok()
                })
                .collect();

            trace!(count = jobs.len(), "Received job batch");
            activated += jobs.len();
            on_batch(jobs);
        }

        Ok(activated)
    }
}

fn deadline_exceeded(deadline: Duration) -> ClientError {
    ClientError::rpc(
        Code::DeadlineExceeded,
        format!("activation exceeded client deadline of {:?}", deadline),
    )
}
