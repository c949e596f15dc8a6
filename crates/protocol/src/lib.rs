// Gateway Protocol for job workers
//
// Decision: gRPC with tonic, generated from proto/gateway.proto at build time
// Decision: Variables and custom headers are JSON documents carried as strings
// Decision: Proto is transport layer, jobflow-client types remain source of truth

use chrono::{DateTime, TimeZone, Utc};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("gateway_protocol");
}

// Re-export for convenience
pub use proto::gateway_client::GatewayClient;

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug)]
pub enum ConversionError {
    /// A document field did not contain valid JSON
    InvalidDocument {
        field: &'static str,
        source: serde_json::Error,
    },
    /// A document field contained JSON that is not an object
    NotAnObject(&'static str),
    /// An epoch timestamp outside the representable range
    InvalidTimestamp(i64),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::InvalidDocument { field, source } => {
                write!(f, "Invalid JSON document in {}: {}", field, source)
            }
            ConversionError::NotAnObject(field) => {
                write!(f, "Expected a JSON object in {}", field)
            }
            ConversionError::InvalidTimestamp(millis) => {
                write!(f, "Invalid epoch timestamp: {}", millis)
            }
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConversionError::InvalidDocument { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ============================================================================
// Time conversion
// ============================================================================

/// Convert epoch milliseconds (as sent by the gateway) to chrono DateTime<Utc>
pub fn epoch_millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, ConversionError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(ConversionError::InvalidTimestamp(millis))
}

// ============================================================================
// JSON documents
// ============================================================================

/// Parse a JSON document field that must hold an object
///
/// An empty string is treated as an empty object, which is what the gateway
/// sends when a job has no variables or headers.
pub fn parse_document(
    field: &'static str,
    document: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, ConversionError> {
    if document.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }

    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|source| ConversionError::InvalidDocument { field, source })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        _ => Err(ConversionError::NotAnObject(field)),
    }
}

/// Serialize an optional JSON value into the string form used on the wire
///
/// `None` becomes the empty string, which the gateway reads as "no variables".
pub fn document_to_wire(value: Option<&serde_json::Value>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
