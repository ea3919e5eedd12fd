//! Bulk wire-protocol strategy: all streams serialized into one push
//! request, snappy-compressed, POSTed with bounded retry.

use crate::batch::Stream;
use crate::client::proto::{EntryAdapter, PushRequest, StreamAdapter};
use crate::client::{send_with_retry, BackoffConfig, DeliveryClient, DeliveryError};
use crate::config::PushConfig;
use crate::labels::RESERVED_TENANT_LABEL;
use prost::Message;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const CONTENT_TYPE: &str = "application/x-protobuf";
const USER_AGENT: &str = concat!("logship/", env!("CARGO_PKG_VERSION"));
const TENANT_HEADER: &str = "X-Scope-OrgID";
const MAX_ERR_MSG_LEN: usize = 1024;

pub struct PushClient {
    http: reqwest::Client,
    config: PushConfig,
    backoff: BackoffConfig,
}

impl PushClient {
    pub fn new(config: PushConfig, backoff: BackoffConfig) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DeliveryError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config,
            backoff,
        })
    }

    async fn push_once(&self, buf: &[u8], tenant: Option<&str>) -> Result<(), DeliveryError> {
        let mut request = self
            .http
            .post(self.config.url.clone())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(buf.to_vec());

        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        } else if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }
        if let Some(tenant) = tenant {
            request = request.header(TENANT_HEADER, tenant);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let mut message = response.text().await.unwrap_or_default();
            message.truncate(MAX_ERR_MSG_LEN);
            return Err(DeliveryError::Http { status, message });
        }
        Ok(())
    }
}

/// Serialize streams into a compressed push request body.
pub(crate) fn encode_push_request(
    streams: &HashMap<String, Stream>,
) -> Result<(Vec<u8>, usize), DeliveryError> {
    let mut request = PushRequest {
        streams: Vec::with_capacity(streams.len()),
    };
    let mut entry_count = 0;
    for (labels, stream) in streams {
        let entries: Vec<EntryAdapter> = stream
            .entries
            .iter()
            .map(|entry| EntryAdapter {
                timestamp: Some(prost_types::Timestamp {
                    seconds: entry.timestamp.timestamp(),
                    nanos: entry.timestamp.timestamp_subsec_nanos() as i32,
                }),
                line: entry.line.clone(),
            })
            .collect();
        entry_count += entries.len();
        request.streams.push(StreamAdapter {
            labels: labels.clone(),
            entries,
        });
    }

    let buf = request.encode_to_vec();
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&buf)
        .map_err(|e| DeliveryError::Encode(e.to_string()))?;
    Ok((compressed, entry_count))
}

#[async_trait::async_trait]
impl DeliveryClient for PushClient {
    async fn send(&self, streams: &HashMap<String, Stream>) -> Result<(), DeliveryError> {
        let (buf, entry_count) = encode_push_request(streams)?;
        debug!(
            streams = streams.len(),
            entries = entry_count,
            body_bytes = buf.len(),
            "pushing batch"
        );

        // A tenant label on any stream overrides the configured tenant.
        let tenant = streams
            .values()
            .find_map(|s| s.labels.get(RESERVED_TENANT_LABEL))
            .or(self.config.tenant_id.as_deref());

        send_with_retry(&self.backoff, || self.push_once(&buf, tenant)).await
    }

    fn entry_weight(&self, line: &str) -> usize {
        line.len()
    }
}
