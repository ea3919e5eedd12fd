//! Invocation-level dispatch: classify the raw event, route it to its source
//! parser, and flush whatever accumulated.

use crate::batch::Batch;
use crate::client::DeliveryClient;
use crate::config::Config;
use crate::error::ForwardError;
use crate::event::{classify, ClassifiedEvent};
use crate::source::store::ObjectStore;
use crate::source::{cloudwatch, kinesis, s3};
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// Queue and topic messages are unwrapped and re-dispatched; a chain deeper
/// than this is rejected rather than followed.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Everything one invocation needs: configuration, a delivery client, and an
/// object store. Built per invocation by the binary, by hand in tests.
pub struct InvocationContext {
    pub config: Config,
    pub client: Arc<dyn DeliveryClient>,
    pub store: Arc<dyn ObjectStore>,
}

impl InvocationContext {
    fn new_batch(&self) -> Batch {
        Batch::new(self.config.batch_size, Arc::clone(&self.client))
    }

    /// Process one raw event document end to end.
    pub async fn process(&self, raw: JsonValue) -> Result<(), ForwardError> {
        self.process_at_depth(raw, 0).await
    }

    // Recursion is indirect (queue and topic bodies re-enter), so the future
    // must be boxed.
    fn process_at_depth(
        &self,
        raw: JsonValue,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(), ForwardError>> + Send + '_>> {
        Box::pin(async move {
            if depth >= MAX_UNWRAP_DEPTH {
                return Err(ForwardError::UnrecognizedEvent);
            }
            let event = classify(&raw).ok_or(ForwardError::UnrecognizedEvent)?;

            match event {
                ClassifiedEvent::ObjectNotification(ev) => {
                    let mut batch = self.new_batch();
                    s3::process(&ev, &self.config, self.store.as_ref(), &mut batch).await?;
                    batch.flush().await?;
                    Ok(())
                }
                ClassifiedEvent::ObjectTestNotification(ev) => {
                    info!(bucket = %ev.bucket, "acknowledging bucket test notification");
                    Ok(())
                }
                ClassifiedEvent::LogGroupSubscription(ev) => {
                    let mut batch = self.new_batch();
                    cloudwatch::process(&ev, &self.config, &mut batch).await?;
                    batch.flush().await?;
                    Ok(())
                }
                ClassifiedEvent::StreamRecordBatch(ev) => {
                    let mut batch = self.new_batch();
                    if self.config.parse_kinesis_cw_logs {
                        kinesis::process_cw_bundled(&ev, &self.config, &mut batch).await?;
                    } else {
                        kinesis::process(&ev, &self.config, &mut batch).await?;
                    }
                    batch.flush().await?;
                    Ok(())
                }
                ClassifiedEvent::QueueMessageBatch(ev) => {
                    for message in &ev.records {
                        let inner: JsonValue =
                            serde_json::from_str(&message.body).map_err(|e| {
                                ForwardError::Decode(format!(
                                    "queue message body is not JSON: {}",
                                    e
                                ))
                            })?;
                        self.process_at_depth(inner, depth + 1).await?;
                    }
                    Ok(())
                }
                ClassifiedEvent::TopicMessageBatch(ev) => {
                    for record in &ev.records {
                        let inner: JsonValue = serde_json::from_str(&record.sns.message)
                            .map_err(|e| {
                                ForwardError::Decode(format!(
                                    "topic message is not JSON: {}",
                                    e
                                ))
                            })?;
                        self.process_at_depth(inner, depth + 1).await?;
                    }
                    Ok(())
                }
                ClassifiedEvent::ScheduledBridgeEvent(ev) => {
                    let mut batch = self.new_batch();
                    s3::process_bridge(&ev, &self.config, self.store.as_ref(), &mut batch)
                        .await?;
                    batch.flush().await?;
                    Ok(())
                }
            }
        })
    }
}
