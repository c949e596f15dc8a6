//! Queue of activated jobs awaiting a handler

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::backpressure::Backpressure;
use crate::job::Job;

/// FIFO buffer shared by the poller (producer) and dispatcher (consumer)
///
/// Each job is handed to exactly one `next` call. Occupancy counts a job from
/// `push` until `mark_handled`, so it covers both queued and in-flight jobs.
#[derive(Debug)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
    backpressure: Backpressure,
    job_available: Notify,
    job_handled: Notify,
}

impl JobQueue {
    pub fn new(max_jobs_active: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(max_jobs_active)),
            backpressure: Backpressure::new(max_jobs_active),
            job_available: Notify::new(),
            job_handled: Notify::new(),
        }
    }

    /// Enqueue an activated job and wake the dispatcher
    pub fn push(&self, job: Job) {
        self.backpressure.job_activated();
        self.jobs.lock().push_back(job);
        self.job_available.notify_one();
    }

    /// Wait for the next job
    ///
    /// Returns `None` once the token is cancelled.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Job> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(job) = self.jobs.lock().pop_front() {
                return Some(job);
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.job_available.notified() => {}
            }
        }
    }

    /// Release a job's slot and wake the poller
    pub fn mark_handled(&self) {
        self.backpressure.job_handled();
        self.job_handled.notify_one();
    }

    /// Sleep for up to `interval`, returning early when a job is handled
    ///
    /// Returns true if the token was cancelled.
    pub async fn wait_for_capacity(&self, interval: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = self.job_handled.notified() => false,
            _ = tokio::time::sleep(interval) => false,
        }
    }

    /// Jobs waiting for a handler
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued plus in-flight jobs
    pub fn occupancy(&self) -> usize {
        self.backpressure.occupancy()
    }

    pub fn backpressure(&self) -> &Backpressure {
        &self.backpressure
    }
}
