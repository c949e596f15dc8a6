//! Activation backpressure for job workers
//!
//! Tracks how many activated jobs are queued or being handled and decides
//! when the poller may ask the gateway for more.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Occupancy tracking with a refill threshold
///
/// The poller activates new jobs only while occupancy is below
/// `ceil(0.6 * max_jobs_active)`, and then only enough to refill to
/// `max_jobs_active`. The gap between threshold and capacity avoids a stream
/// of tiny activations each time a single job finishes.
///
/// Uses atomic operations for thread-safe access without locks.
#[derive(Debug)]
pub struct Backpressure {
    max_jobs_active: usize,
    threshold: usize,
    occupancy: AtomicUsize,
}

impl Backpressure {
    /// Create backpressure state for the given capacity
    pub fn new(max_jobs_active: usize) -> Self {
        let max_jobs_active = max_jobs_active.max(1);
        Self {
            max_jobs_active,
            threshold: (max_jobs_active * 3).div_ceil(5),
            occupancy: AtomicUsize::new(0),
        }
    }

    /// Whether the poller should activate more jobs
    pub fn should_activate(&self) -> bool {
        self.occupancy() < self.threshold
    }

    /// How many jobs to request so occupancy refills to capacity
    pub fn jobs_to_activate(&self) -> usize {
        self.max_jobs_active.saturating_sub(self.occupancy())
    }

    /// Current number of queued plus in-flight jobs
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Acquire)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn max_jobs_active(&self) -> usize {
        self.max_jobs_active
    }

    /// Record that a job was activated and queued
    pub fn job_activated(&self) {
        self.occupancy.fetch_add(1, Ordering::AcqRel);
    }

    /// Record that a job finished handling
    pub fn job_handled(&self) {
        let _ = self
            .occupancy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
