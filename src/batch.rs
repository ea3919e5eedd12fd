//! Batch accumulation: records are grouped into streams keyed by their
//! canonical label string and flushed through the delivery client whenever
//! the size counter crosses the configured threshold.

use crate::client::{DeliveryClient, DeliveryError};
use crate::labels::LabelSet;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One timestamped log line.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Entries sharing one label set, in arrival order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stream {
    pub labels: LabelSet,
    pub entries: Vec<Entry>,
}

/// A labeled entry on its way into a batch.
#[derive(Clone, Debug)]
pub struct Record {
    pub labels: LabelSet,
    pub entry: Entry,
}

pub struct Batch {
    streams: HashMap<String, Stream>,
    size: usize,
    threshold: usize,
    client: Arc<dyn DeliveryClient>,
}

impl Batch {
    pub fn new(threshold: usize, client: Arc<dyn DeliveryClient>) -> Self {
        Self {
            streams: HashMap::new(),
            size: 0,
            threshold,
            client,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Append a record to its stream, creating the stream on first sight,
    /// then flush synchronously if the batch has grown past the threshold.
    pub async fn add(&mut self, record: Record) -> Result<(), DeliveryError> {
        let key = record.labels.grouping_key();
        self.size += self.client.entry_weight(&record.entry.line);

        let stream = self.streams.entry(key).or_insert_with(|| Stream {
            labels: record.labels,
            entries: Vec::new(),
        });
        stream.entries.push(record.entry);

        if self.size > self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send everything accumulated so far. State is cleared only after a
    /// successful send, so a failed flush leaves the batch intact.
    pub async fn flush(&mut self) -> Result<(), DeliveryError> {
        if self.streams.is_empty() {
            return Ok(());
        }
        debug!(
            streams = self.streams.len(),
            size = self.size,
            "flushing batch"
        );
        let client = Arc::clone(&self.client);
        client.send(&self.streams).await?;
        self.streams.clear();
        self.size = 0;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::DeliveryError;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records every send; weight of an entry is its line length. Shared by
    /// the integration tests.
    pub(crate) struct RecordingClient {
        pub sends: Mutex<Vec<HashMap<String, Stream>>>,
        pub fail_next: Mutex<bool>,
    }

    impl RecordingClient {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                sends: Mutex::new(Vec::new()),
                fail_next: Mutex::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl DeliveryClient for RecordingClient {
        async fn send(&self, streams: &HashMap<String, Stream>) -> Result<(), DeliveryError> {
            if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                return Err(DeliveryError::Http {
                    status: 400,
                    message: "injected".to_string(),
                });
            }
            self.sends.lock().unwrap().push(streams.clone());
            Ok(())
        }

        fn entry_weight(&self, line: &str) -> usize {
            line.len()
        }
    }

    fn record(labels: &[(&str, &str)], line: &str) -> Record {
        Record {
            labels: labels.iter().map(|(k, v)| (*k, *v)).collect(),
            entry: Entry {
                timestamp: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
                line: line.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn records_with_equal_labels_share_a_stream() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(1_000, client.clone());

        batch.add(record(&[("app", "web")], "one")).await.unwrap();
        batch.add(record(&[("app", "web")], "two")).await.unwrap();
        batch.add(record(&[("app", "db")], "three")).await.unwrap();
        assert_eq!(batch.stream_count(), 2);

        batch.flush().await.unwrap();
        let sends = client.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        let web = &sends[0][r#"{app="web"}"#];
        assert_eq!(web.entries.len(), 2);
        assert_eq!(web.entries[0].line, "one");
        assert_eq!(web.entries[1].line, "two");
    }

    #[tokio::test]
    async fn crossing_the_threshold_flushes_synchronously() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(5, client.clone());

        batch.add(record(&[("a", "1")], "abc")).await.unwrap();
        assert!(client.sends.lock().unwrap().is_empty());

        // 3 + 3 bytes > 5: this add flushes both entries.
        batch.add(record(&[("a", "1")], "def")).await.unwrap();
        {
            let sends = client.sends.lock().unwrap();
            assert_eq!(sends.len(), 1);
            assert_eq!(sends[0][r#"{a="1"}"#].entries.len(), 2);
        }
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn failed_flush_leaves_the_batch_intact() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(1_000, client.clone());
        batch.add(record(&[("a", "1")], "kept")).await.unwrap();

        *client.fail_next.lock().unwrap() = true;
        assert!(batch.flush().await.is_err());
        assert!(!batch.is_empty());

        batch.flush().await.unwrap();
        assert_eq!(client.sends.lock().unwrap().len(), 1);
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let client = RecordingClient::new();
        let mut batch = Batch::new(10, client.clone());
        batch.flush().await.unwrap();
        assert!(client.sends.lock().unwrap().is_empty());
    }
}
