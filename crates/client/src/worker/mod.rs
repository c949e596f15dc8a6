//! Job workers
//!
//! This module provides:
//! - [`JobWorkerBuilder`] - Fluent worker configuration, opened into a [`JobWorker`]
//! - [`JobWorkerConfig`] - Serializable worker settings with environment loading
//! - [`JobHandler`] - Async or blocking business logic run per job
//! - [`TrackingJobClient`] - Records whether a handler completed or failed its job
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          JobWorker                            │
//! │  ┌──────────────┐   push   ┌──────────┐   next   ┌─────────┐  │
//! │  │  JobPoller   │ ───────▶ │ JobQueue │ ───────▶ │Dispatch │  │
//! │  │ (long poll)  │          │ (FIFO)   │          │ (slots) │  │
//! │  └──────▲───────┘          └────┬─────┘          └────┬────┘  │
//! │         │   occupancy < 60% of max_jobs_active        │       │
//! │         └───────────────────────┘                     ▼       │
//! │                                          handler → complete / │
//! │                                                    fail job   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The poller and dispatcher share one cancellation token. Closing the worker
//! cancels it, waits for both loops, and then waits for in-flight handlers.

mod activation;
mod backpressure;
mod builder;
mod config;
mod dispatcher;
mod handler;
mod job_client;
mod poller;
mod queue;

pub use activation::{activation_deadline, JobActivationClient};
pub use backpressure::Backpressure;
pub use builder::{JobWorker, JobWorkerBuilder};
pub use config::JobWorkerConfig;
pub use dispatcher::{failure_message, JobDispatcher};
pub use handler::{HandlerResult, JobClientRef, JobHandler};
pub use job_client::TrackingJobClient;
pub use poller::{JobPoller, PollerState};
pub use queue::JobQueue;
