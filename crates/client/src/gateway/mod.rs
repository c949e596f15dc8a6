//! Gateway RPC abstraction
//!
//! This module provides:
//! - [`Gateway`] - The RPC surface the worker consumes
//! - [`GrpcGateway`] - Implementation over the tonic stub
//! - [`InMemoryGateway`] - Scripted implementation for tests and local runs

mod grpc;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use jobflow_protocol::proto;

use crate::error::Result;

pub use grpc::GrpcGateway;
pub use memory::{activated_job, InMemoryGateway};

/// Stream of activation responses; ends when the gateway half-closes the call
pub type ActivationStream = BoxStream<'static, Result<proto::ActivateJobsResponse>>;

/// Gateway operations used by job workers
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a streaming activation call
    ///
    /// `deadline` bounds the whole call on the client side and must be larger
    /// than the long-poll timeout embedded in the request.
    async fn activate_jobs(
        &self,
        request: proto::ActivateJobsRequest,
        deadline: Duration,
    ) -> Result<ActivationStream>;

    async fn complete_job(&self, request: proto::CompleteJobRequest) -> Result<()>;

    async fn fail_job(&self, request: proto::FailJobRequest) -> Result<()>;

    async fn throw_error(&self, request: proto::ThrowErrorRequest) -> Result<()>;
}
