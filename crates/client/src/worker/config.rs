//! Job worker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, Result};

/// Settings snapshot for one job worker
///
/// Built by [`JobWorkerBuilder`](super::JobWorkerBuilder) and never changed
/// once the worker is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobWorkerConfig {
    /// Job type to subscribe to
    pub job_type: String,

    /// Name reported to the gateway as the activating worker
    pub worker_name: String,

    /// How long an activated job stays exclusively assigned to this worker
    #[serde(with = "crate::duration_millis")]
    pub timeout: Duration,

    /// Upper bound on queued plus in-flight jobs
    pub max_jobs_active: usize,

    /// Concurrent handler invocations
    pub handler_threads: u8,

    /// Idle wait between polls while the queue is above the refill threshold
    #[serde(with = "crate::duration_millis")]
    pub poll_interval: Duration,

    /// Server-side long-poll timeout of an activation call
    #[serde(with = "crate::duration_millis")]
    pub polling_timeout: Duration,

    /// Complete jobs whose handler returned without using the job client
    pub auto_completion: bool,

    /// Variables to fetch; empty fetches all of them
    #[serde(default)]
    pub fetch_variables: Vec<String>,

    /// Tenants to activate jobs for; empty uses the gateway default
    #[serde(default)]
    pub tenant_ids: Vec<String>,

    /// Upper bound on waiting for in-flight handlers when closing
    #[serde(with = "crate::duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            job_type: String::new(),
            worker_name: format!("worker-{}", Uuid::now_v7()),
            timeout: Duration::from_secs(5 * 60),
            max_jobs_active: 32,
            handler_threads: 1,
            poll_interval: Duration::from_millis(100),
            polling_timeout: Duration::from_secs(10),
            auto_completion: false,
            fetch_variables: vec![],
            tenant_ids: vec![],
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl JobWorkerConfig {
    /// Create configuration for the given job type
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `JOBFLOW_JOB_TYPE`: job type to subscribe to
    /// - `JOBFLOW_WORKER_NAME`: worker name (default: "worker-<uuid>")
    /// - `JOBFLOW_MAX_JOBS_ACTIVE`: queued plus in-flight limit (default: 32)
    /// - `JOBFLOW_HANDLER_THREADS`: concurrent handlers (default: 1)
    /// - `JOBFLOW_POLL_INTERVAL_MS`: idle poll interval (default: 100)
    /// - `JOBFLOW_POLLING_TIMEOUT_MS`: long-poll timeout (default: 10000)
    /// - `JOBFLOW_JOB_TIMEOUT_MS`: exclusive assignment timeout (default: 300000)
    /// - `JOBFLOW_AUTO_COMPLETE`: "true" or "1" to auto-complete (default: false)
    /// - `JOBFLOW_TENANT_IDS`: comma-separated tenant ids
    /// - `JOBFLOW_FETCH_VARIABLES`: comma-separated variable names
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let job_type = std::env::var("JOBFLOW_JOB_TYPE").unwrap_or(defaults.job_type);
        let worker_name = std::env::var("JOBFLOW_WORKER_NAME").unwrap_or(defaults.worker_name);

        let max_jobs_active = env_parse("JOBFLOW_MAX_JOBS_ACTIVE").unwrap_or(defaults.max_jobs_active);
        let handler_threads = env_parse("JOBFLOW_HANDLER_THREADS").unwrap_or(defaults.handler_threads);

        let poll_interval = env_millis("JOBFLOW_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval);
        let polling_timeout =
            env_millis("JOBFLOW_POLLING_TIMEOUT_MS").unwrap_or(defaults.polling_timeout);
        let timeout = env_millis("JOBFLOW_JOB_TIMEOUT_MS").unwrap_or(defaults.timeout);

        let auto_completion = std::env::var("JOBFLOW_AUTO_COMPLETE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.auto_completion);

        let tenant_ids = env_list("JOBFLOW_TENANT_IDS").unwrap_or(defaults.tenant_ids);
        let fetch_variables = env_list("JOBFLOW_FETCH_VARIABLES").unwrap_or(defaults.fetch_variables);

        Self {
            job_type,
            worker_name,
            timeout,
            max_jobs_active,
            handler_threads,
            poll_interval,
            polling_timeout,
            auto_completion,
            fetch_variables,
            tenant_ids,
            ..defaults
        }
    }

    /// Check the settings a worker cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.job_type.trim().is_empty() {
            return Err(ClientError::config("job type must not be empty"));
        }
        if self.max_jobs_active == 0 {
            return Err(ClientError::config("max jobs active must be greater than 0"));
        }
        if self.handler_threads == 0 {
            return Err(ClientError::config("handler threads must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::config("poll interval must be greater than 0"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}
