// gRPC-backed gateway
//
// Decision: One tonic channel per client, cloned per call (tonic clients are cheap handles)
// Decision: Deadlines are sent as grpc-timeout; the activation client also enforces them locally

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use jobflow_protocol::{proto, GatewayClient};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use super::{ActivationStream, Gateway};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Gateway implementation over a tonic channel
#[derive(Debug, Clone)]
pub struct GrpcGateway {
    client: GatewayClient<Channel>,
}

impl GrpcGateway {
    /// Connect to the gateway described by the configuration
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        info!(endpoint = %endpoint, "Connecting to gateway");

        let channel = Endpoint::from_shared(endpoint)?
            .connect_timeout(config.connect_timeout)
            .connect()
            .await?;

        Ok(Self::from_channel(channel))
    }

    /// Create from an existing channel
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: GatewayClient::new(channel),
        }
    }
}

#[async_trait]
impl Gateway for GrpcGateway {
    async fn activate_jobs(
        &self,
        request: proto::ActivateJobsRequest,
        deadline: Duration,
    ) -> Result<ActivationStream> {
        let mut client = self.client.clone();

        debug!(
            job_type = %request.r#type,
            max_jobs = request.max_jobs_to_activate,
            deadline_ms = deadline.as_millis() as u64,
            "gRPC activate_jobs"
        );

        let mut request = tonic::Request::new(request);
        request.set_timeout(deadline);

        let stream = client.activate_jobs(request).await?.into_inner();
        Ok(stream.map(|item| item.map_err(ClientError::from)).boxed())
    }

    async fn complete_job(&self, request: proto::CompleteJobRequest) -> Result<()> {
        let mut client = self.client.clone();
        client.complete_job(request).await?;
        Ok(())
    }

    async fn fail_job(&self, request: proto::FailJobRequest) -> Result<()> {
        let mut client = self.client.clone();
        client.fail_job(request).await?;
        Ok(())
    }

    async fn throw_error(&self, request: proto::ThrowErrorRequest) -> Result<()> {
        let mut client = self.client.clone();
        client.throw_error(request).await?;
        Ok(())
    }
}
