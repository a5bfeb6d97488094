/*
 * gRPC Client for the Broker
 *
 * `BrokerApi` is the controller's view of a broker; `BrokerClient` is the
 * gRPC implementation. The tonic client is cloned per call, so one
 * `BrokerClient` can serve the long-running SubmitJob and the control calls
 * at the same time over a single channel.
 */

use async_trait::async_trait;
use gol_common::{
    retry_async, ClientConfig, ControlReport, GolError, Grid, JobReport, Result, ShutdownReport,
    StatusReport, TickReport,
};
use gol_proto::error_from_status;
use gol_proto::grpc::gol_broker_client::GolBrokerClient;
use gol_proto::grpc::{
    CheckStatusRequest, GridFrame, InterruptRequest, PauseRequest, ResumeRequest,
    SubmitJobRequest, TerminateRequest, TickRequest,
};
use tonic::transport::Channel;

/// Operations the controller needs from a broker.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Runs a job to completion, or attaches to the one already running.
    async fn submit_job(&self, grid: Grid, turns: u32) -> Result<JobReport>;

    async fn check_status(&self) -> Result<StatusReport>;

    async fn tick(&self) -> Result<TickReport>;

    async fn pause(&self) -> Result<ControlReport>;

    async fn resume(&self) -> Result<ControlReport>;

    /// Snapshot of the current generation.
    async fn interrupt(&self) -> Result<JobReport>;

    async fn terminate(&self, reason: &str) -> Result<ShutdownReport>;
}

/// Client for the broker's gRPC service.
#[derive(Clone)]
pub struct BrokerClient {
    address: String,
    client: GolBrokerClient<Channel>,
}

impl BrokerClient {
    /// Connects to the broker, retrying per `connect_retry`.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let address = config.broker_addr.clone();
        let endpoint = Channel::from_shared(address.clone())
            .map_err(|e| GolError::Config(format!("invalid broker address {}: {}", address, e)))?;

        let channel = retry_async(&config.connect_retry, || {
            let endpoint = endpoint.clone();
            let address = address.clone();
            async move {
                endpoint.connect().await.map_err(|e| {
                    GolError::Communication(format!("cannot connect to broker {}: {}", address, e))
                })
            }
        })
        .await?;

        let client = GolBrokerClient::new(channel)
            .max_decoding_message_size(config.max_message_bytes)
            .max_encoding_message_size(config.max_message_bytes);

        tracing::info!("Connected to broker at {}", address);
        Ok(Self { address, client })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl BrokerApi for BrokerClient {
    async fn submit_job(&self, grid: Grid, turns: u32) -> Result<JobReport> {
        let request = SubmitJobRequest {
            grid: Some(GridFrame::from(&grid)),
            turns,
        };
        let response = self
            .client
            .clone()
            .submit_job(request)
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn check_status(&self) -> Result<StatusReport> {
        let response = self
            .client
            .clone()
            .check_status(CheckStatusRequest {})
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn tick(&self) -> Result<TickReport> {
        let response = self
            .client
            .clone()
            .tick(TickRequest {})
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn pause(&self) -> Result<ControlReport> {
        let response = self
            .client
            .clone()
            .pause(PauseRequest {})
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn resume(&self) -> Result<ControlReport> {
        let response = self
            .client
            .clone()
            .resume(ResumeRequest {})
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn interrupt(&self) -> Result<JobReport> {
        let response = self
            .client
            .clone()
            .interrupt(InterruptRequest {})
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }

    async fn terminate(&self, reason: &str) -> Result<ShutdownReport> {
        let response = self
            .client
            .clone()
            .terminate(TerminateRequest {
                reason: reason.to_string(),
            })
            .await
            .map_err(error_from_status)?;
        Ok(response.into_inner().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_common::{ClientConfigBuilder, RetryConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_broker_is_an_error() {
        let config = ClientConfigBuilder::default()
            .broker_addr("http://127.0.0.1:1")
            .connect_retry(RetryConfig {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                backoff_multiplier: 1.0,
                jitter_factor: 0.0,
            })
            .build()
            .unwrap();

        let result = BrokerClient::connect(&config).await;
        assert!(matches!(result, Err(GolError::Communication(_))));
    }

    #[tokio::test]
    async fn test_bad_address_is_config_error() {
        let config = ClientConfigBuilder::default()
            .broker_addr("not a uri")
            .build()
            .unwrap();
        assert!(matches!(
            BrokerClient::connect(&config).await,
            Err(GolError::Config(_))
        ));
    }
}
