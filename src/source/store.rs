//! Object retrieval behind a trait so parsers can be exercised against
//! in-memory fixtures.

use crate::error::ForwardError;
use aws_config::{BehaviorVersion, Region};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Retrieve one object's full contents.
    async fn fetch(
        &self,
        region: &str,
        bucket: &str,
        key: &str,
        expected_owner: Option<&str>,
    ) -> Result<Bytes, ForwardError>;
}

/// Bucket-backed store with one SDK client per region, built lazily and kept
/// for the process lifetime.
pub struct S3ObjectStore {
    clients: Mutex<HashMap<String, aws_sdk_s3::Client>>,
}

impl S3ObjectStore {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client_for(&self, region: &str) -> aws_sdk_s3::Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&config);
        clients.insert(region.to_string(), client.clone());
        client
    }
}

impl Default for S3ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(
        &self,
        region: &str,
        bucket: &str,
        key: &str,
        expected_owner: Option<&str>,
    ) -> Result<Bytes, ForwardError> {
        info!(bucket, key, region, "fetching object");
        let client = self.client_for(region).await;
        let response = client
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_expected_bucket_owner(expected_owner.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                ForwardError::ObjectFetch(format!(
                    "failed to get object {} from bucket {}: {}",
                    key, bucket, e
                ))
            })?;
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ForwardError::ObjectFetch(format!("failed to read object {}: {}", key, e)))?;
        Ok(body.into_bytes())
    }
}
