//! Use-tracking job client

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::command::{CompleteJobCommand, FailJobCommand, JobClient, ThrowErrorCommand};

/// Decorates a job client and records whether a handler created any command
///
/// One instance is created per handler invocation, so the flag always starts
/// cleared. Creating a command counts as use even if it is never sent.
pub struct TrackingJobClient {
    inner: Arc<dyn JobClient>,
    used: AtomicBool,
}

impl TrackingJobClient {
    pub fn new(inner: Arc<dyn JobClient>) -> Self {
        Self {
            inner,
            used: AtomicBool::new(false),
        }
    }

    /// Whether complete, fail or throw-error was requested through this client
    pub fn was_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }
}

impl JobClient for TrackingJobClient {
    fn new_complete_job_command(&self, job_key: i64) -> CompleteJobCommand {
        self.mark_used();
        self.inner.new_complete_job_command(job_key)
    }

    fn new_fail_command(&self, job_key: i64) -> FailJobCommand {
        self.mark_used();
        self.inner.new_fail_command(job_key)
    }

    fn new_throw_error_command(&self, job_key: i64) -> ThrowErrorCommand {
        self.mark_used();
        self.inner.new_throw_error_command(job_key)
    }
}
