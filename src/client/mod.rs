//! Delivery path: two interchangeable backend strategies behind one trait.

use crate::batch::Stream;
use crate::config::{Backend, Config};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

mod proto;
pub mod otlp;
pub mod push;

pub use otlp::OtlpClient;
pub use push::PushClient;

#[derive(Debug)]
pub enum DeliveryError {
    /// Backend answered with a non-2xx status.
    Http { status: u16, message: String },
    /// Transport-level failure (connect, timeout, TLS).
    Network(String),
    /// The batch could not be serialized for the wire.
    Encode(String),
    /// The streaming exporter failed to build, emit, or drain.
    Exporter(String),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Http { status, message } => {
                write!(f, "server returned HTTP {}: {}", status, message)
            }
            DeliveryError::Network(msg) => write!(f, "network error: {}", msg),
            DeliveryError::Encode(msg) => write!(f, "encode error: {}", msg),
            DeliveryError::Exporter(msg) => write!(f, "exporter error: {}", msg),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl DeliveryError {
    /// Only 429, 5xx and transport-level errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            DeliveryError::Network(_) => true,
            DeliveryError::Encode(_) | DeliveryError::Exporter(_) => false,
        }
    }
}

/// Backend delivery contract shared by both strategies.
#[async_trait::async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Encode and transmit the streams of one batch.
    async fn send(&self, streams: &HashMap<String, Stream>) -> Result<(), DeliveryError>;

    /// How much one entry contributes to the batch size counter: bytes for
    /// size-bounded backends, 1 for count-bounded ones.
    fn entry_weight(&self, line: &str) -> usize;

    /// Drain anything buffered below the adapter at the end of an invocation.
    async fn shutdown(&self) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Exponential backoff state with a retry cap: `wait` burns one retry and
/// sleeps only while the budget lasts.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

pub struct Backoff {
    config: BackoffConfig,
    num_retries: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let next_delay = config.min;
        Self {
            config,
            num_retries: 0,
            next_delay,
        }
    }

    pub fn ongoing(&self) -> bool {
        self.num_retries < self.config.max_retries
    }

    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }

    pub async fn wait(&mut self) {
        self.num_retries += 1;
        if self.ongoing() {
            tokio::time::sleep(self.next_delay).await;
            self.next_delay = self.next_delay.saturating_mul(2).min(self.config.max);
        }
    }
}

/// Drive an attempt closure under the backoff policy. The first attempt is
/// always made; non-retryable errors return immediately; when the retry
/// budget runs out the last error is returned.
pub async fn send_with_retry<F, Fut>(
    config: &BackoffConfig,
    mut attempt: F,
) -> Result<(), DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), DeliveryError>>,
{
    let mut backoff = Backoff::new(config.clone());
    loop {
        let err = match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };
        warn!(error = %err, retries = backoff.num_retries(), "error sending batch, will retry");
        backoff.wait().await;
        if !backoff.ongoing() {
            return Err(err);
        }
    }
}

/// Build the delivery client the configuration names. The X-Ray trace id, if
/// present, is attached to streaming records as an attribute.
pub fn build_client(
    config: &Config,
    trace_id: Option<String>,
) -> Result<Arc<dyn DeliveryClient>, DeliveryError> {
    match &config.backend {
        Backend::Push(push) => Ok(Arc::new(PushClient::new(
            push.clone(),
            BackoffConfig::default(),
        )?)),
        Backend::Otlp(otlp) => Ok(Arc::new(OtlpClient::new(otlp, trace_id)?)),
    }
}
