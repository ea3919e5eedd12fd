//! Log-group subscription payloads: base64-encoded gzipped JSON carrying a
//! batch of log events for one group and stream.

use crate::batch::{Batch, Entry, Record};
use crate::config::Config;
use crate::error::ForwardError;
use crate::event::CloudwatchLogsEvent;
use crate::labels::{apply_resource_attributes, LabelSet};
use crate::source::gunzip;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsData {
    pub owner: String,
    pub log_group: String,
    pub log_stream: String,
    #[serde(default)]
    pub subscription_filters: Vec<String>,
    pub message_type: Option<String>,
    pub log_events: Vec<LogEvent>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: Option<String>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub message: String,
}

/// Unwrap the transport encoding: base64, then gzip, then JSON.
pub fn decode_payload(data: &str) -> Result<LogsData, ForwardError> {
    let compressed = BASE64
        .decode(data)
        .map_err(|e| ForwardError::Decode(format!("payload is not valid base64: {}", e)))?;
    let raw = gunzip(&compressed)
        .map_err(|e| ForwardError::Decode(format!("payload is not valid gzip: {}", e)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| ForwardError::Decode(format!("malformed subscription payload: {}", e)))
}

pub async fn process(
    event: &CloudwatchLogsEvent,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let data = decode_payload(&event.awslogs.data)?;
    add_log_events(&data, config, batch).await
}

/// Forward one decoded subscription payload. Shared with the stream path
/// when records carry bundled subscription data.
pub(crate) async fn add_log_events(
    data: &LogsData,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let mut labels = LabelSet::new();
    labels.insert("__aws_log_type", "cloudwatch");
    labels.insert("__aws_cloudwatch_log_group", &data.log_group);
    labels.insert("__aws_cloudwatch_owner", &data.owner);
    if config.keep_stream {
        labels.insert("__aws_cloudwatch_log_stream", &data.log_stream);
    }
    let labels =
        apply_resource_attributes(labels, &config.extra_attributes, &config.drop_attributes);

    for event in &data.log_events {
        if config.print_log_lines {
            info!(log_line = %event.message);
        }
        let timestamp = DateTime::from_timestamp_millis(event.timestamp).unwrap_or_else(Utc::now);
        batch
            .add(Record {
                labels: labels.clone(),
                entry: Entry {
                    timestamp,
                    line: event.message.clone(),
                },
            })
            .await?;
    }
    Ok(())
}
