//! Streaming-record strategy: one OTLP log record per entry, handed to the
//! SDK exporter. Batching and retry below the emit call belong to the SDK;
//! this client is responsible for building correct records and draining the
//! provider at the end of the invocation.

use crate::batch::Stream;
use crate::client::{DeliveryClient, DeliveryError};
use crate::config::OtlpConfig;
use chrono::{DateTime, Utc};
use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const TRACE_ID_ATTRIBUTE: &str = "trace_id";

pub struct OtlpClient {
    provider: SdkLoggerProvider,
    logger: SdkLogger,
    trace_id: Option<String>,
}

impl OtlpClient {
    pub fn new(config: &OtlpConfig, trace_id: Option<String>) -> Result<Self, DeliveryError> {
        let endpoint = if config.insecure {
            config.endpoint.replacen("https://", "http://", 1)
        } else {
            config.endpoint.clone()
        };

        let exporter = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| DeliveryError::Exporter(e.to_string()))?;

        let provider = SdkLoggerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(config.service_name.clone())
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let logger = provider.logger(env!("CARGO_PKG_NAME"));

        Ok(Self {
            provider,
            logger,
            trace_id,
        })
    }
}

fn to_system_time(timestamp: DateTime<Utc>) -> SystemTime {
    match u64::try_from(timestamp.timestamp()) {
        Ok(secs) => {
            UNIX_EPOCH + std::time::Duration::new(secs, timestamp.timestamp_subsec_nanos())
        }
        // Pre-epoch timestamps clamp to the epoch.
        Err(_) => UNIX_EPOCH,
    }
}

#[async_trait::async_trait]
impl DeliveryClient for OtlpClient {
    async fn send(&self, streams: &HashMap<String, Stream>) -> Result<(), DeliveryError> {
        let now = SystemTime::now();
        for stream in streams.values() {
            for entry in &stream.entries {
                let mut record = self.logger.create_log_record();
                record.set_timestamp(to_system_time(entry.timestamp));
                record.set_observed_timestamp(now);
                record.set_body(AnyValue::from(entry.line.clone()));
                for (key, value) in stream.labels.iter() {
                    record.add_attribute(key.to_string(), value.to_string());
                }
                if let Some(trace_id) = &self.trace_id {
                    record.add_attribute(TRACE_ID_ATTRIBUTE, trace_id.clone());
                }
                self.logger.emit(record);
            }
        }
        debug!(streams = streams.len(), "emitted batch to exporter");
        Ok(())
    }

    fn entry_weight(&self, _line: &str) -> usize {
        1
    }

    async fn shutdown(&self) -> Result<(), DeliveryError> {
        self.provider
            .shutdown()
            .map_err(|e| DeliveryError::Exporter(e.to_string()))
    }
}
