//! Client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::RetryPolicy;

/// Connection settings for the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Gateway address, with or without scheme (e.g. "127.0.0.1:26500")
    pub gateway_address: String,

    /// Timeout for establishing the channel
    #[serde(with = "crate::duration_millis")]
    pub connect_timeout: Duration,

    /// Backoff used by `send_with_retry`
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_address: "127.0.0.1:26500".to_string(),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Create configuration for the given gateway address
    pub fn new(gateway_address: impl Into<String>) -> Self {
        Self {
            gateway_address: gateway_address.into(),
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `JOBFLOW_GATEWAY_ADDRESS`: gateway address (default: "127.0.0.1:26500")
    /// - `JOBFLOW_CONNECT_TIMEOUT_MS`: channel connect timeout (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let gateway_address =
            std::env::var("JOBFLOW_GATEWAY_ADDRESS").unwrap_or(defaults.gateway_address);

        let connect_timeout = std::env::var("JOBFLOW_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.connect_timeout);

        Self {
            gateway_address,
            connect_timeout,
            ..defaults
        }
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Gateway endpoint URI, adding a plaintext scheme when none is given
    pub fn endpoint(&self) -> String {
        if self.gateway_address.contains("://") {
            self.gateway_address.clone()
        } else {
            format!("http://{}", self.gateway_address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.gateway_address, "127.0.0.1:26500");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_endpoint_scheme() {
        assert_eq!(
            ClientConfig::new("gateway:26500").endpoint(),
            "http://gateway:26500"
        );
        assert_eq!(
            ClientConfig::new("https://gateway.example.com:443").endpoint(),
            "https://gateway.example.com:443"
        );
    }

    #[test]
    fn test_serialization() {
        let config = ClientConfig::new("gateway:26500");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["connect_timeout"], 10000);

        let parsed: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }
}
