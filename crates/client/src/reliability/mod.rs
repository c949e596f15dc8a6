//! Reliability patterns for gateway calls
//!
//! This module provides:
//! - [`ExponentialBackoff`] - Next-delay supplier with growth, clamping and jitter
//! - [`RetryStrategy`] - Retries transient gateway errors with cancellable waits
//! - [`RetryPolicy`] - Serializable retry spacing configuration

mod backoff;
mod retry;

pub use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use retry::{RetryDelay, RetryPolicy, RetryStrategy, WaitTimeProvider};
