//! Bucket object processing: resolve the object's log format from its key,
//! fetch and decompress it, and forward one record per line (or per JSON
//! record, for record-array objects).

use crate::batch::{Batch, Entry, Record};
use crate::config::Config;
use crate::decode::stream_json_records;
use crate::error::ForwardError;
use crate::event::{BridgeEvent, S3Event};
use crate::labels::{apply_resource_attributes, LabelSet};
use crate::source::registry::{
    self, FormatDescriptor, ResolvedFormat, TimestampKind, LB_NLB_TYPE,
};
use crate::source::store::ObjectStore;
use crate::source::{gunzip, is_gzipped};
use crate::timestamp::{parse_string_timestamp, split_unix_fraction};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::{debug, info};

/// Everything needed to fetch one object.
#[derive(Clone, Debug)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub owner: Option<String>,
}

pub async fn process(
    event: &S3Event,
    config: &Config,
    store: &dyn ObjectStore,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    for record in &event.records {
        let locator = ObjectLocator {
            bucket: record.s3.bucket.name.clone(),
            key: record.s3.object.key.clone(),
            region: record.aws_region.clone(),
            owner: record
                .s3
                .bucket
                .owner_identity
                .as_ref()
                .and_then(|identity| identity.principal_id.clone()),
        };
        process_object(&locator, config, store, batch).await?;
    }
    Ok(())
}

/// An object-created bridge event names one object; route it through the
/// same path as a direct notification.
pub async fn process_bridge(
    event: &BridgeEvent,
    config: &Config,
    store: &dyn ObjectStore,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let detail = event
        .object_created_detail()
        .map_err(|e| ForwardError::Decode(format!("malformed object-created detail: {}", e)))?;
    let locator = ObjectLocator {
        bucket: detail.bucket.name,
        key: detail.object.key,
        region: event.region.clone(),
        owner: Some(event.account.clone()),
    };
    process_object(&locator, config, store, batch).await
}

async fn process_object(
    locator: &ObjectLocator,
    config: &Config,
    store: &dyn ObjectStore,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let resolved = registry::resolve(&locator.key, config.custom_s3_path_regex.as_ref())
        .ok_or_else(|| ForwardError::UnknownObjectFormat(locator.key.clone()))?;

    match resolved {
        ResolvedFormat::Skipped => {
            debug!(key = %locator.key, "skipping digest object");
            Ok(())
        }
        ResolvedFormat::Known {
            descriptor,
            captures,
        } => {
            info!(key = %locator.key, log_type = descriptor.log_type_label, "processing object");
            let data = store
                .fetch(
                    &locator.region,
                    &locator.bucket,
                    &locator.key,
                    locator.owner.as_deref(),
                )
                .await?;
            let data = if descriptor.gzip_compressed {
                gunzip(&data).map_err(|e| ForwardError::Decode(e.to_string()))?
            } else {
                data.to_vec()
            };
            let labels = known_labels(descriptor, &captures, config);

            if descriptor.json_records {
                forward_record_array(data, descriptor.skip_header_count, labels, config, batch)
                    .await
            } else {
                let format = LineFormat {
                    skip_header_count: descriptor.skip_header_count,
                    timestamp: descriptor
                        .timestamp_regex
                        .zip(descriptor.timestamp_kind),
                    append_zone_suffix: captures.get("lb_type").map(String::as_str)
                        == Some(LB_NLB_TYPE),
                };
                forward_lines(&data, format, labels, config, batch).await
            }
        }
        ResolvedFormat::Custom { captures } => {
            info!(key = %locator.key, log_type = "custom", "processing object");
            let data = store
                .fetch(
                    &locator.region,
                    &locator.bucket,
                    &locator.key,
                    locator.owner.as_deref(),
                )
                .await?;
            let data = if is_gzipped(&data) {
                gunzip(&data).map_err(|e| ForwardError::Decode(e.to_string()))?
            } else {
                data.to_vec()
            };
            let labels = custom_labels(&captures, locator, config);
            let format = LineFormat {
                skip_header_count: 0,
                timestamp: None,
                append_zone_suffix: false,
            };
            forward_lines(&data, format, labels, config, batch).await
        }
    }
}

fn known_labels(
    descriptor: &FormatDescriptor,
    captures: &HashMap<String, String>,
    config: &Config,
) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert("__aws_log_type", descriptor.log_type_label);
    if let Some(src) = captures.get("src") {
        labels.insert(format!("__aws_{}", descriptor.log_type_label), src);
    }
    if let Some(owner_key) = descriptor.owner_label_key {
        if let Some(owner) = captures.get(owner_key) {
            labels.insert(format!("__aws_{}_owner", descriptor.log_type_label), owner);
        }
    }
    apply_resource_attributes(labels, &config.extra_attributes, &config.drop_attributes)
}

/// Custom objects carry their captures and provenance as labels: the bucket
/// coordinates map to fixed names, everything else is prefixed `__custom_`.
fn custom_labels(
    captures: &HashMap<String, String>,
    locator: &ObjectLocator,
    config: &Config,
) -> LabelSet {
    let mut labels = LabelSet::new();
    labels.insert("__aws_log_type", "custom");
    if let Some(src) = captures.get("src") {
        labels.insert("__aws_custom", src);
    }

    let mut sources = captures.clone();
    sources.insert("bucket".to_string(), locator.bucket.clone());
    sources.insert("key".to_string(), locator.key.clone());
    sources.insert("bucket_region".to_string(), locator.region.clone());
    if let Some(owner) = &locator.owner {
        sources.insert("bucket_owner".to_string(), owner.clone());
    }
    for (name, value) in &sources {
        if name == "type" || value.is_empty() {
            continue;
        }
        match name.as_str() {
            "bucket" => labels.insert("__aws_bucket_name", value),
            "bucket_region" => labels.insert("__aws_bucket_region", value),
            "key" => labels.insert("__aws_bucket_key", value),
            _ => labels.insert(format!("__custom_{}", name), value),
        }
    }
    apply_resource_attributes(labels, &config.extra_attributes, &config.drop_attributes)
}

struct LineFormat {
    skip_header_count: usize,
    timestamp: Option<(&'static Regex, TimestampKind)>,
    /// Network load balancer timestamps lack the `Z` suffix the zone-aware
    /// format requires.
    append_zone_suffix: bool,
}

async fn forward_lines(
    data: &[u8],
    format: LineFormat,
    labels: LabelSet,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let text = String::from_utf8_lossy(data);
    for line in text.lines().skip(format.skip_header_count) {
        if config.print_log_lines {
            info!(log_line = line);
        }
        let timestamp = line_timestamp(&format, line)?;
        batch
            .add(Record {
                labels: labels.clone(),
                entry: Entry {
                    timestamp,
                    line: line.to_string(),
                },
            })
            .await?;
    }
    Ok(())
}

/// Extract the line's timestamp; lines without a match carry the current
/// time, a matched-but-unparsable timestamp is an error.
fn line_timestamp(format: &LineFormat, line: &str) -> Result<DateTime<Utc>, ForwardError> {
    let Some((regex, kind)) = format.timestamp else {
        return Ok(Utc::now());
    };
    let Some(matched) = regex.captures(line).and_then(|c| c.name("timestamp")) else {
        return Ok(Utc::now());
    };

    let mut raw = matched.as_str().to_string();
    if format.append_zone_suffix {
        raw.push('Z');
    }
    match kind {
        TimestampKind::String(chrono_format) => {
            parse_string_timestamp(&raw, chrono_format).map_err(ForwardError::Decode)
        }
        TimestampKind::Unix => {
            let (sec, nsec) = split_unix_fraction(&raw)?;
            Ok(DateTime::from_timestamp(sec, nsec).unwrap_or_else(Utc::now))
        }
    }
}

/// Record-array objects (the CloudTrail layout): each record's `eventTime`
/// becomes the timestamp and the re-serialized record becomes the line.
async fn forward_record_array(
    data: Vec<u8>,
    skip_tokens: usize,
    labels: LabelSet,
    config: &Config,
    batch: &mut Batch,
) -> Result<(), ForwardError> {
    let mut records = stream_json_records(Cursor::new(data), skip_tokens);
    while let Some(unit) = records.recv().await {
        let record = unit?;
        let timestamp = match record.get("eventTime").and_then(|v| v.as_str()) {
            Some(raw) => parse_string_timestamp(raw, "%+").map_err(ForwardError::Decode)?,
            None => Utc::now(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| ForwardError::Decode(e.to_string()))?;
        if config.print_log_lines {
            info!(log_line = %line);
        }
        batch
            .add(Record {
                labels: labels.clone(),
                entry: Entry { timestamp, line },
            })
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::RecordingClient;
    use crate::batch::Stream;
    use crate::config::Config;
    use crate::source::gzip_bytes;
    use bytes::Bytes;
    use chrono::TimeZone;

    const ALB_KEY: &str = "AWSLogs/123456789012/elasticloadbalancing/us-east-1/2022/01/24/123456789012_elasticloadbalancing_us-east-1_app.my-lb.b13ea9d19f16d015_20220124T0000Z_0.0.0.0_2et2e1mx.log.gz";
    const NLB_KEY: &str = "AWSLogs/123456789012/elasticloadbalancing/us-east-2/2016/05/01/123456789012_elasticloadbalancing_us-east-2_net.my-lb.1234567890abcdef_201605010000Z_2soosksi.log.gz";
    const CLOUDTRAIL_KEY: &str = "AWSLogs/123456789012/CloudTrail/us-east-2/2015/08/01/123456789012_CloudTrail_us-east-2_20150801T0210Z_Mu0KsOhtH1ar15ZZ.json.gz";
    const CLOUDTRAIL_DIGEST_KEY: &str = "AWSLogs/123456789012/CloudTrail-Digest/us-east-2/2015/08/01/123456789012_CloudTrail-Digest_us-east-2_20150801T0210Z_Mu0KsOhtH1ar15ZZ.json.gz";

    struct MemoryStore {
        objects: HashMap<String, Bytes>,
    }

    impl MemoryStore {
        fn with(key: &str, data: Vec<u8>) -> Self {
            let mut objects = HashMap::new();
            objects.insert(key.to_string(), Bytes::from(data));
            Self { objects }
        }

        fn empty() -> Self {
            Self {
                objects: HashMap::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl ObjectStore for MemoryStore {
        async fn fetch(
            &self,
            _region: &str,
            _bucket: &str,
            key: &str,
            _expected_owner: Option<&str>,
        ) -> Result<Bytes, ForwardError> {
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| ForwardError::ObjectFetch(format!("no such object {}", key)))
        }
    }

    fn push_config() -> Config {
        Config::from_lookup(|var| match var {
            "WRITE_ADDRESS" => Some("https://loki.example/push".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn locator(key: &str) -> ObjectLocator {
        ObjectLocator {
            bucket: "my-bucket".to_string(),
            key: key.to_string(),
            region: "us-east-1".to_string(),
            owner: Some("123456789012".to_string()),
        }
    }

    async fn run_object(
        key: &str,
        data: Vec<u8>,
        config: &Config,
    ) -> Vec<HashMap<String, Stream>> {
        let client = RecordingClient::new();
        let mut batch = Batch::new(1_000_000, client.clone());
        let store = MemoryStore::with(key, data);
        process_object(&locator(key), config, &store, &mut batch)
            .await
            .unwrap();
        batch.flush().await.unwrap();
        let sends = client.sends.lock().unwrap().clone();
        sends
    }

    #[tokio::test]
    async fn alb_object_forwards_labeled_timestamped_lines() {
        let body = "http 2022-01-24T00:00:05.000000Z app/my-lb/1a2b3c4d 10.0.0.1:2817 first\nhttp 2022-01-24T00:00:06.000000Z app/my-lb/1a2b3c4d 10.0.0.2:2817 second\n";
        let sends = run_object(ALB_KEY, gzip_bytes(body.as_bytes()), &push_config()).await;
        assert_eq!(sends.len(), 1);

        let key = r#"{__aws_log_type="s3_lb", __aws_s3_lb="my-lb", __aws_s3_lb_owner="123456789012"}"#;
        let stream = &sends[0][key];
        assert_eq!(stream.entries.len(), 2);
        assert_eq!(
            stream.entries[0].timestamp,
            Utc.with_ymd_and_hms(2022, 1, 24, 0, 0, 5).unwrap()
        );
        assert!(stream.entries[1].line.ends_with("second"));
    }

    #[tokio::test]
    async fn nlb_timestamps_gain_the_zone_suffix() {
        let body = "tls 2.0 2016-05-01T00:00:07 net/my-lb/1a2b3c4d listener\n";
        let sends = run_object(NLB_KEY, gzip_bytes(body.as_bytes()), &push_config()).await;
        let stream = sends[0].values().next().unwrap();
        assert_eq!(
            stream.entries[0].timestamp,
            Utc.with_ymd_and_hms(2016, 5, 1, 0, 0, 7).unwrap()
        );
    }

    #[tokio::test]
    async fn cloudtrail_records_stream_individually() {
        let body = r#"{"Records": [
            {"eventTime": "2015-08-01T02:10:00Z", "eventName": "PutObject"},
            {"eventTime": "2015-08-01T02:10:30Z", "eventName": "GetObject"}
        ]}"#;
        let sends = run_object(CLOUDTRAIL_KEY, gzip_bytes(body.as_bytes()), &push_config()).await;

        let key = r#"{__aws_log_type="s3_cloudtrail", __aws_s3_cloudtrail="Mu0KsOhtH1ar15ZZ", __aws_s3_cloudtrail_owner="123456789012"}"#;
        let stream = &sends[0][key];
        assert_eq!(stream.entries.len(), 2);
        assert_eq!(
            stream.entries[0].timestamp,
            Utc.with_ymd_and_hms(2015, 8, 1, 2, 10, 0).unwrap()
        );
        // The line is the re-serialized record, not the raw slice.
        let parsed: serde_json::Value =
            serde_json::from_str(&stream.entries[1].line).unwrap();
        assert_eq!(parsed["eventName"], "GetObject");
    }

    #[tokio::test]
    async fn digest_objects_are_skipped_without_a_fetch() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(1_000, client.clone());
        // An empty store: a fetch attempt would fail the test.
        let store = MemoryStore::empty();
        process_object(&locator(CLOUDTRAIL_DIGEST_KEY), &push_config(), &store, &mut batch)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn unknown_keys_fail_before_fetching() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(1_000, client.clone());
        let store = MemoryStore::empty();
        let err = process_object(&locator("random/object.txt"), &push_config(), &store, &mut batch)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::UnknownObjectFormat(_)));
    }

    #[tokio::test]
    async fn custom_pattern_maps_captures_and_provenance_labels() {
        let config = Config::from_lookup(|var| match var {
            "WRITE_ADDRESS" => Some("https://loki.example/push".to_string()),
            "CUSTOM_S3_PATH_REGEX" => Some(r"app-logs/(?P<service>[\w-]+)/".to_string()),
            _ => None,
        })
        .unwrap();

        let key = "app-logs/checkout/2022-01-24.log";
        // Uncompressed custom object, detected by the missing magic bytes.
        let sends = run_object(key, b"plain line".to_vec(), &config).await;
        let stream = sends[0].values().next().unwrap();
        assert_eq!(stream.labels.get("__aws_log_type"), Some("custom"));
        assert_eq!(stream.labels.get("__custom_service"), Some("checkout"));
        assert_eq!(stream.labels.get("__aws_bucket_name"), Some("my-bucket"));
        assert_eq!(stream.labels.get("__aws_bucket_key"), Some(key));
        assert_eq!(stream.labels.get("__aws_bucket_region"), Some("us-east-1"));
        assert_eq!(stream.entries[0].line, "plain line");
    }

    #[tokio::test]
    async fn custom_gzipped_objects_are_detected_and_inflated() {
        let config = Config::from_lookup(|var| match var {
            "WRITE_ADDRESS" => Some("https://loki.example/push".to_string()),
            "CUSTOM_S3_PATH_REGEX" => Some(r"app-logs/".to_string()),
            _ => None,
        })
        .unwrap();
        let sends = run_object(
            "app-logs/2022-01-24.log.gz",
            gzip_bytes(b"inflated line"),
            &config,
        )
        .await;
        assert_eq!(sends[0].values().next().unwrap().entries[0].line, "inflated line");
    }

    #[tokio::test]
    async fn extra_attributes_reach_object_streams() {
        let config = Config::from_lookup(|var| match var {
            "WRITE_ADDRESS" => Some("https://loki.example/push".to_string()),
            "EXTRA_ATTRIBUTES" => Some("env,prod".to_string()),
            "DROP_ATTRIBUTES" => Some("__aws_s3_lb_owner".to_string()),
            _ => None,
        })
        .unwrap();
        let body = "http 2022-01-24T00:00:05.000000Z line\n";
        let sends = run_object(ALB_KEY, gzip_bytes(body.as_bytes()), &config).await;
        let stream = sends[0].values().next().unwrap();
        assert_eq!(stream.labels.get("env"), Some("prod"));
        assert_eq!(stream.labels.get("__aws_s3_lb_owner"), None);
    }
}
