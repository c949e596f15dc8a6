//! In-memory implementation of Gateway for testing

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use jobflow_protocol::proto;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tonic::Code;

use super::{ActivationStream, Gateway};
use crate::error::{ClientError, Result};

/// Recorded state of the in-memory gateway
#[derive(Default)]
struct GatewayState {
    batches: VecDeque<Vec<proto::ActivatedJob>>,
    activation_failures: VecDeque<Code>,
    command_failures: VecDeque<Code>,
    activation_requests: Vec<proto::ActivateJobsRequest>,
    completed: Vec<proto::CompleteJobRequest>,
    failed: Vec<proto::FailJobRequest>,
    thrown: Vec<proto::ThrowErrorRequest>,
    command_attempts: usize,
}

/// In-memory implementation of Gateway
///
/// Serves scripted job batches in order, one batch per activation call
/// (truncated to the requested amount, the remainder is served next). When no
/// batch is scripted the call is held for the request's long-poll timeout and
/// then ends without jobs, like a real gateway would. Every request is
/// recorded for later inspection.
///
/// # Example
///
/// ```
/// use jobflow_client::gateway::{activated_job, InMemoryGateway};
///
/// let gateway = InMemoryGateway::new();
/// gateway.push_batch(vec![activated_job(1, "foo"), activated_job(2, "foo")]);
/// ```
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
    jobs_pushed: Notify,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Create a new in-memory gateway with no scripted jobs
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            jobs_pushed: Notify::new(),
        }
    }

    /// Script a batch of jobs for a future activation call
    pub fn push_batch(&self, jobs: Vec<proto::ActivatedJob>) {
        self.state.lock().batches.push_back(jobs);
        self.jobs_pushed.notify_waiters();
    }

    /// Fail the next `times` activation calls with the given status code
    pub fn fail_next_activations(&self, code: Code, times: usize) {
        let mut state = self.state.lock();
        state.activation_failures.extend(std::iter::repeat(code).take(times));
    }

    /// Fail the next `times` job commands with the given status code
    pub fn fail_next_commands(&self, code: Code, times: usize) {
        let mut state = self.state.lock();
        state.command_failures.extend(std::iter::repeat(code).take(times));
    }

    /// All activation requests received so far
    pub fn activation_requests(&self) -> Vec<proto::ActivateJobsRequest> {
        self.state.lock().activation_requests.clone()
    }

    /// All successful complete-job commands
    pub fn completed_jobs(&self) -> Vec<proto::CompleteJobRequest> {
        self.state.lock().completed.clone()
    }

    /// Keys of completed jobs, in completion order
    pub fn completed_keys(&self) -> Vec<i64> {
        self.state.lock().completed.iter().map(|r| r.job_key).collect()
    }

    /// All successful fail-job commands
    pub fn failed_jobs(&self) -> Vec<proto::FailJobRequest> {
        self.state.lock().failed.clone()
    }

    /// All successful throw-error commands
    pub fn thrown_errors(&self) -> Vec<proto::ThrowErrorRequest> {
        self.state.lock().thrown.clone()
    }

    /// Number of job commands received, including failed attempts
    pub fn command_attempts(&self) -> usize {
        self.state.lock().command_attempts
    }

    /// Number of scripted batches not yet served
    pub fn pending_batches(&self) -> usize {
        self.state.lock().batches.len()
    }

    fn take_batch(&self, max_jobs: usize, worker: &str) -> Option<Vec<proto::ActivatedJob>> {
        let mut state = self.state.lock();
        let batch = state.batches.front_mut()?;

        let mut served: Vec<_> = if batch.len() > max_jobs {
            batch.drain(..max_jobs).collect()
        } else {
            state.batches.pop_front().unwrap_or_default()
        };

        for job in &mut served {
            job.worker = worker.to_string();
        }
        Some(served)
    }

    fn record_command<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&mut GatewayState),
    {
        let mut state = self.state.lock();
        state.command_attempts += 1;
        if let Some(code) = state.command_failures.pop_front() {
            return Err(ClientError::rpc(code, "scripted command failure"));
        }
        record(&mut state);
        Ok(())
    }
}

#[async_trait]
impl Gateway for InMemoryGateway {
    async fn activate_jobs(
        &self,
        request: proto::ActivateJobsRequest,
        _deadline: Duration,
    ) -> Result<ActivationStream> {
        {
            let mut state = self.state.lock();
            state.activation_requests.push(request.clone());
            if let Some(code) = state.activation_failures.pop_front() {
                return Err(ClientError::rpc(code, "scripted activation failure"));
            }
        }

        let max_jobs = request.max_jobs_to_activate.max(0) as usize;
        let long_poll = Duration::from_millis(request.request_timeout.max(0) as u64);

        // Registered before checking so a concurrent push is not missed
        let pushed = self.jobs_pushed.notified();

        let batch = match self.take_batch(max_jobs, &request.worker) {
            Some(batch) => Some(batch),
            None => {
                // Hold the request like a long poll, returning early if jobs arrive
                tokio::select! {
                    _ = tokio::time::sleep(long_poll) => None,
                    _ = pushed => self.take_batch(max_jobs, &request.worker),
                }
            }
        };

        let responses: Vec<Result<proto::ActivateJobsResponse>> = batch
            .into_iter()
            .map(|jobs| Ok(proto::ActivateJobsResponse { jobs }))
            .collect();

        Ok(futures::stream::iter(responses).boxed())
    }

    async fn complete_job(&self, request: proto::CompleteJobRequest) -> Result<()> {
        self.record_command(|state| state.completed.push(request))
    }

    async fn fail_job(&self, request: proto::FailJobRequest) -> Result<()> {
        self.record_command(|state| state.failed.push(request))
    }

    async fn throw_error(&self, request: proto::ThrowErrorRequest) -> Result<()> {
        self.record_command(|state| state.thrown.push(request))
    }
}

/// Build a wire job with sensible defaults for tests and demos
///
/// Three retries, an empty variables document and a deadline five minutes
/// from now.
pub fn activated_job(key: i64, job_type: &str) -> proto::ActivatedJob {
    proto::ActivatedJob {
        key,
        r#type: job_type.to_string(),
        retries: 3,
        deadline: (Utc::now() + chrono::Duration::minutes(5)).timestamp_millis(),
        variables: "{}".to_string(),
        custom_headers: "{}".to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(max_jobs: i32) -> proto::ActivateJobsRequest {
        proto::ActivateJobsRequest {
            r#type: "foo".to_string(),
            worker: "test-worker".to_string(),
            max_jobs_to_activate: max_jobs,
            request_timeout: 20,
            ..Default::default()
        }
    }

    async fn collect(gateway: &InMemoryGateway, max_jobs: i32) -> Vec<i64> {
        let stream = gateway
            .activate_jobs(request(max_jobs), Duration::from_secs(1))
            .await
            .unwrap();
        let responses: Vec<_> = stream.collect().await;
        responses
            .into_iter()
            .flat_map(|r| r.unwrap().jobs)
            .map(|j| j.key)
            .collect()
    }

    #[tokio::test]
    async fn test_serves_batches_in_order() {
        let gateway = InMemoryGateway::new();
        gateway.push_batch(vec![activated_job(1, "foo"), activated_job(2, "foo")]);
        gateway.push_batch(vec![activated_job(3, "foo")]);

        assert_eq!(collect(&gateway, 10).await, vec![1, 2]);
        assert_eq!(collect(&gateway, 10).await, vec![3]);
        assert!(collect(&gateway, 10).await.is_empty());
        assert_eq!(gateway.activation_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_truncates_to_requested_amount() {
        let gateway = InMemoryGateway::new();
        gateway.push_batch(vec![
            activated_job(1, "foo"),
            activated_job(2, "foo"),
            activated_job(3, "foo"),
        ]);

        assert_eq!(collect(&gateway, 2).await, vec![1, 2]);
        assert_eq!(gateway.pending_batches(), 1);
        assert_eq!(collect(&gateway, 2).await, vec![3]);
    }

    #[tokio::test]
    async fn test_sets_worker_name() {
        let gateway = InMemoryGateway::new();
        gateway.push_batch(vec![activated_job(1, "foo")]);

        let stream = gateway
            .activate_jobs(request(1), Duration::from_secs(1))
            .await
            .unwrap();
        let responses: Vec<_> = stream.collect().await;
        let job = &responses[0].as_ref().unwrap().jobs[0];
        assert_eq!(job.worker, "test-worker");
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next_activations(Code::Unavailable, 1);
        gateway.fail_next_commands(Code::NotFound, 1);

        let err = gateway
            .activate_jobs(request(1), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Some(Code::Unavailable));

        let complete = proto::CompleteJobRequest {
            job_key: 7,
            ..Default::default()
        };
        let err = gateway.complete_job(complete.clone()).await.unwrap_err();
        assert_eq!(err.code(), Some(Code::NotFound));

        gateway.complete_job(complete).await.unwrap();
        assert_eq!(gateway.completed_keys(), vec![7]);
        assert_eq!(gateway.command_attempts(), 2);
    }
}
