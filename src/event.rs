//! Envelope shapes and event-type discrimination.
//!
//! Classification is structural: each candidate shape is tried in a fixed
//! priority order with strict decoding (`deny_unknown_fields` on the
//! discriminating structs), and the first shape that decodes wins. The four
//! `Records`-shaped envelopes (object notification, stream, queue, topic) are
//! told apart purely by their record fields, so the record structs must stay
//! strict even where values are optional.

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Object-storage notification: one or more objects created in a bucket.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Event {
    #[serde(rename = "Records")]
    pub records: Vec<S3EventRecord>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct S3EventRecord {
    pub event_version: Option<String>,
    pub event_source: String,
    pub aws_region: String,
    pub event_time: Option<String>,
    pub event_name: Option<String>,
    pub user_identity: Option<JsonValue>,
    pub request_parameters: Option<JsonValue>,
    pub response_elements: Option<JsonValue>,
    pub s3: S3Entity,
    pub glacier_event_data: Option<JsonValue>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Entity {
    pub s3_schema_version: Option<String>,
    pub configuration_id: Option<String>,
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Bucket {
    pub name: String,
    pub owner_identity: Option<S3UserIdentity>,
    pub arn: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3UserIdentity {
    pub principal_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    pub key: String,
    pub size: Option<i64>,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub sequencer: Option<String>,
}

/// The test notification S3 sends when bucket notifications are first
/// configured. Acknowledged without any work.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct S3TestEvent {
    pub service: String,
    pub event: String,
    pub time: String,
    pub bucket: String,
    pub request_id: String,
    pub host_id: String,
}

/// CloudWatch Logs subscription: the payload is base64-encoded gzipped JSON.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudwatchLogsEvent {
    pub awslogs: AwsLogsPayload,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwsLogsPayload {
    pub data: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KinesisEvent {
    #[serde(rename = "Records")]
    pub records: Vec<KinesisEventRecord>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KinesisEventRecord {
    pub kinesis: KinesisRecord,
    pub event_source: String,
    pub event_version: Option<String>,
    #[serde(rename = "eventID")]
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub invoke_identity_arn: Option<String>,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: String,
    pub aws_region: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisRecord {
    pub kinesis_schema_version: Option<String>,
    pub partition_key: Option<String>,
    pub sequence_number: Option<String>,
    /// Base64-encoded record payload.
    pub data: String,
    pub approximate_arrival_timestamp: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SqsMessage>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SqsMessage {
    pub message_id: String,
    pub receipt_handle: Option<String>,
    pub body: String,
    pub attributes: Option<JsonValue>,
    pub message_attributes: Option<JsonValue>,
    pub md5_of_message_attributes: Option<String>,
    pub md5_of_body: Option<String>,
    pub event_source: Option<String>,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: Option<String>,
    pub aws_region: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnsEvent {
    #[serde(rename = "Records")]
    pub records: Vec<SnsEventRecord>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SnsEventRecord {
    pub event_version: Option<String>,
    pub event_subscription_arn: Option<String>,
    pub event_source: Option<String>,
    pub sns: SnsMessage,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnsMessage {
    #[serde(rename = "Type")]
    pub message_type: Option<String>,
    pub message_id: Option<String>,
    pub topic_arn: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: Option<String>,
    pub signature_version: Option<String>,
    pub signature: Option<String>,
    #[serde(rename = "SigningCertUrl", alias = "SigningCertURL")]
    pub signing_cert_url: Option<String>,
    #[serde(rename = "UnsubscribeUrl", alias = "UnsubscribeURL")]
    pub unsubscribe_url: Option<String>,
    pub message_attributes: Option<JsonValue>,
}

/// EventBridge envelope; for this adapter the detail carries an S3
/// "Object Created" notification.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeEvent {
    pub version: Option<String>,
    pub id: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub source: String,
    pub account: String,
    pub time: String,
    pub region: String,
    pub resources: Vec<String>,
    pub detail: JsonValue,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ObjectCreatedDetail {
    pub bucket: BridgeBucket,
    pub object: BridgeObject,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BridgeBucket {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BridgeObject {
    pub key: String,
}

impl BridgeEvent {
    pub fn object_created_detail(&self) -> Result<ObjectCreatedDetail, serde_json::Error> {
        serde_json::from_value(self.detail.clone())
    }
}

/// A raw event tagged with the envelope shape it matched.
#[derive(Clone, Debug)]
pub enum ClassifiedEvent {
    ObjectNotification(S3Event),
    ObjectTestNotification(S3TestEvent),
    LogGroupSubscription(CloudwatchLogsEvent),
    StreamRecordBatch(KinesisEvent),
    QueueMessageBatch(SqsEvent),
    TopicMessageBatch(SnsEvent),
    ScheduledBridgeEvent(BridgeEvent),
}

fn try_shape<T: serde::de::DeserializeOwned>(raw: &JsonValue) -> Option<T> {
    serde_json::from_value(raw.clone()).ok()
}

/// Try each candidate shape in priority order; the first strict decode wins.
/// Returns `None` when nothing matches — events are rejected, never guessed.
pub fn classify(raw: &JsonValue) -> Option<ClassifiedEvent> {
    if let Some(ev) = try_shape::<S3Event>(raw) {
        return Some(ClassifiedEvent::ObjectNotification(ev));
    }
    if let Some(ev) = try_shape::<S3TestEvent>(raw) {
        return Some(ClassifiedEvent::ObjectTestNotification(ev));
    }
    if let Some(ev) = try_shape::<CloudwatchLogsEvent>(raw) {
        return Some(ClassifiedEvent::LogGroupSubscription(ev));
    }
    if let Some(ev) = try_shape::<KinesisEvent>(raw) {
        return Some(ClassifiedEvent::StreamRecordBatch(ev));
    }
    if let Some(ev) = try_shape::<SqsEvent>(raw) {
        return Some(ClassifiedEvent::QueueMessageBatch(ev));
    }
    if let Some(ev) = try_shape::<SnsEvent>(raw) {
        return Some(ClassifiedEvent::TopicMessageBatch(ev));
    }
    if let Some(ev) = try_shape::<BridgeEvent>(raw) {
        return Some(ClassifiedEvent::ScheduledBridgeEvent(ev));
    }
    None
}
