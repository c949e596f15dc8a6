//! Client error type and gateway status classification

use jobflow_protocol::ConversionError;
use tonic::Code;

/// Errors returned by gateway calls and worker configuration
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The gateway answered with a non-OK status
    #[error("gateway returned {code:?}: {message}")]
    Rpc { code: Code, message: String },

    /// The channel to the gateway could not be established
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Variables could not be (de)serialized
    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The gateway sent a job that could not be converted
    #[error("invalid job from gateway: {0}")]
    Conversion(#[from] ConversionError),

    /// The operation observed a cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid worker or command configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<tonic::Status> for ClientError {
    fn from(status: tonic::Status) -> Self {
        Self::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl ClientError {
    /// Create an RPC error with the given status code
    pub fn rpc(code: Code, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The gateway status code, if this error came from an RPC
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error is a transient gateway condition worth retrying
    ///
    /// Resource exhaustion is how the broker signals overload; unavailability
    /// covers leader changes and gateway restarts.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code(),
            Some(Code::ResourceExhausted) | Some(Code::Unavailable)
        )
    }

    /// Whether the error is the normal end of a long-polling activation
    pub fn is_expected_poll_end(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(
                self.code(),
                Some(Code::DeadlineExceeded) | Some(Code::Cancelled)
            )
    }
}

/// Result alias used throughout the client
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_code() {
        let err = ClientError::from(tonic::Status::not_found("job 1 not found"));
        assert_eq!(err.code(), Some(Code::NotFound));
        assert_eq!(err.to_string(), "gateway returned NotFound: job 1 not found");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::rpc(Code::ResourceExhausted, "overloaded").is_transient());
        assert!(ClientError::rpc(Code::Unavailable, "leader change").is_transient());
        assert!(!ClientError::rpc(Code::NotFound, "gone").is_transient());
        assert!(!ClientError::rpc(Code::InvalidArgument, "bad").is_transient());
        assert!(!ClientError::Cancelled.is_transient());
    }

    #[test]
    fn test_expected_poll_end() {
        assert!(ClientError::rpc(Code::DeadlineExceeded, "").is_expected_poll_end());
        assert!(ClientError::rpc(Code::Cancelled, "").is_expected_poll_end());
        assert!(ClientError::Cancelled.is_expected_poll_end());
        assert!(!ClientError::rpc(Code::Internal, "").is_expected_poll_end());
    }
}
