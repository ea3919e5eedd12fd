//! Stream record batches. Two modes: raw records forwarded as single lines,
//! and an optional mode that treats each record as a gzipped log-group
//! subscription payload.

use crate::batch::{Batch, Entry, Record};
use crate::config::Config;
use crate::error::ForwardError;
use crate::event::KinesisEvent;
use crate::labels::{apply_resource_attributes, LabelSet};
use crate::source::{cloudwatch, gunzip, is_gzipped};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tracing::info;

fn record_data(data: &str) -> Result<Vec<u8>, ForwardError> {
    BASE64
        .decode(data)
        .map_err(|e| ForwardError::Decode(format!("record data is not valid base64: {}", e)))
}

pub async fn process(
    event: &KinesisEvent,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    for record in &event.records {
        let timestamp =
            DateTime::from_timestamp(record.kinesis.approximate_arrival_timestamp as i64, 0)
                .unwrap_or_else(Utc::now);

        let mut labels = LabelSet::new();
        labels.insert("__aws_log_type", "kinesis");
        labels.insert("__aws_kinesis_event_source_arn", &record.event_source_arn);
        let labels =
            apply_resource_attributes(labels, &config.extra_attributes, &config.drop_attributes);

        let data = record_data(&record.kinesis.data)?;
        let data = if is_gzipped(&data) {
            gunzip(&data).map_err(|e| ForwardError::Decode(e.to_string()))?
        } else {
            data
        };
        let line = String::from_utf8_lossy(&data).into_owned();
        if config.print_log_lines {
            info!(log_line = %line);
        }
        batch
            .add(Record {
                labels,
                entry: Entry { timestamp, line },
            })
            .await?;
    }
    Ok(())
}

/// Records carrying bundled log-group subscription payloads: each record is
/// gzipped JSON and forwards with log-group labels rather than stream ones.
pub async fn process_cw_bundled(
    event: &KinesisEvent,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    for record in &event.records {
        let compressed = record_data(&record.kinesis.data)?;
        let raw = gunzip(&compressed)
            .map_err(|e| ForwardError::Decode(format!("record is not valid gzip: {}", e)))?;
        let data: cloudwatch::LogsData = serde_json::from_slice(&raw)
            .map_err(|e| ForwardError::Decode(format!("malformed subscription payload: {}", e)))?;
        cloudwatch::add_log_events(&data, config, batch).await?;
    }
    Ok(())
}
