//! Invocation-level error taxonomy. Everything here is fatal for the current
//! event; only transient delivery statuses are retried, inside the client.

use crate::client::DeliveryError;
use crate::config::ConfigError;
use crate::decode::DecodeError;
use crate::timestamp::TimestampError;

#[derive(Debug)]
pub enum ForwardError {
    /// No supported envelope shape matched the incoming document.
    UnrecognizedEvent,
    /// An object key matched no registry entry and no custom fallback.
    UnknownObjectFormat(String),
    /// Malformed compressed or JSON payload.
    Decode(String),
    /// Backend rejected the batch after the retry budget, or with a
    /// non-retryable status. Batch state is left unflushed.
    Delivery(DeliveryError),
    /// Object retrieval from the store failed.
    ObjectFetch(String),
    Config(ConfigError),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::UnrecognizedEvent => write!(f, "unrecognized event shape"),
            ForwardError::UnknownObjectFormat(key) => {
                write!(f, "could not determine log format for object {:?}", key)
            }
            ForwardError::Decode(msg) => write!(f, "decode error: {}", msg),
            ForwardError::Delivery(e) => write!(f, "delivery failed: {}", e),
            ForwardError::ObjectFetch(msg) => write!(f, "object fetch failed: {}", msg),
            ForwardError::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

impl std::error::Error for ForwardError {}

impl From<DeliveryError> for ForwardError {
    fn from(e: DeliveryError) -> Self {
        ForwardError::Delivery(e)
    }
}

impl From<ConfigError> for ForwardError {
    fn from(e: ConfigError) -> Self {
        ForwardError::Config(e)
    }
}

impl From<DecodeError> for ForwardError {
    fn from(e: DecodeError) -> Self {
        ForwardError::Decode(e.to_string())
    }
}

impl From<TimestampError> for ForwardError {
    fn from(e: TimestampError) -> Self {
        ForwardError::Decode(e.to_string())
    }
}
