//! # Jobflow Client
//!
//! A gRPC client for a workflow engine gateway, centred on job workers that
//! pull jobs of one type, run them through user code and report the outcome.
//!
//! ## Features
//!
//! - **Streaming activation**: long-polling activation calls with a client
//!   deadline that always outlives the server-side poll
//! - **Backpressure**: new jobs are requested only when occupancy falls below
//!   60% of `max_jobs_active`, and only enough to refill it
//! - **Bounded handlers**: async or blocking handlers with a configurable
//!   degree of parallelism, FIFO when single-threaded
//! - **Failure reporting**: handler errors and panics become fail-job commands
//!   with a decremented retry count
//! - **Retries**: exponential backoff with jitter for transient gateway errors
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Client                               │
//! │  (job commands, worker builders, retry strategy)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        JobWorker                             │
//! │  (poller → queue → dispatcher → handler)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Gateway (gRPC / in-memory)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use jobflow_client::prelude::*;
//!
//! let client = Client::connect(&ClientConfig::from_env()).await?;
//!
//! let worker = client
//!     .new_worker()
//!     .job_type("payment-service")
//!     .handler(|client, job| async move {
//!         let order: Order = job.variables_as()?;
//!         charge(&order).await?;
//!         client
//!             .new_complete_job_command(job.key())
//!             .variables(json!({"charged": true}))
//!             .send()
//!             .await?;
//!         Ok(())
//!     })
//!     .open()?;
//!
//! tokio::signal::ctrl_c().await?;
//! worker.close().await;
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod reliability;
pub mod worker;

pub(crate) mod duration_millis;

/// Prelude for common imports
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::command::{CompleteJobCommand, FailJobCommand, JobClient, ThrowErrorCommand};
    pub use crate::config::ClientConfig;
    pub use crate::error::{ClientError, Result};
    pub use crate::gateway::{Gateway, GrpcGateway, InMemoryGateway};
    pub use crate::job::Job;
    pub use crate::reliability::{ExponentialBackoff, RetryPolicy, RetryStrategy};
    pub use crate::worker::{
        HandlerResult, JobClientRef, JobHandler, JobWorker, JobWorkerBuilder, JobWorkerConfig,
    };
}

pub use client::Client;
pub use command::JobClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use job::Job;
pub use worker::{JobWorker, JobWorkerBuilder, JobWorkerConfig};
