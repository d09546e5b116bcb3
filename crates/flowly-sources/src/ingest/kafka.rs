use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use rskafka::client::{
    consumer::{StartOffset, StreamConsumerBuilder},
    partition::UnknownTopicHandling,
    ClientBuilder,
};
use tracing::info;

use super::RecordSource;
use crate::error::IngestError;

/// Upper bound on how long one fetch waits for new records.
const FETCH_MAX_WAIT_MS: i32 = 500;

type RecordStream = BoxStream<'static, Result<Vec<u8>, IngestError>>;

/// One Kafka partition, consumed from the newest offset onwards.
pub struct KafkaSource {
    records: RecordStream,
}

impl KafkaSource {
    /// Connect to `brokers`, log the topics they serve and open `partition`
    /// of `topic`. No historical replay: consumption starts at the latest
    /// offset.
    pub async fn connect(brokers: Vec<String>, topic: &str, partition: i32) -> Result<Self, IngestError> {
        if brokers.is_empty() {
            return Err(IngestError::Connect("no brokers configured".to_string()));
        }

        let client = ClientBuilder::new(brokers.clone())
            .build()
            .await
            .map_err(|e| IngestError::Connect(format!("{}: {e}", brokers.join(","))))?;

        let topics = client
            .list_topics()
            .await
            .map_err(|e| IngestError::Connect(format!("could not list topics: {e}")))?;
        let names: Vec<&str> = topics.iter().map(|t| t.name.as_str()).collect();
        info!(topics = ?names, "topics on kafka");

        let partition_client = client
            .partition_client(topic.to_owned(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| {
                IngestError::Connect(format!("could not open {topic}/{partition}: {e}"))
            })?;

        let records = StreamConsumerBuilder::new(Arc::new(partition_client), StartOffset::Latest)
            .with_max_wait_ms(FETCH_MAX_WAIT_MS)
            .build()
            .map(|item| {
                item.map(|(record, _high_watermark)| record.record.value.unwrap_or_default())
                    .map_err(|e| IngestError::Source(e.to_string()))
            })
            .boxed();

        info!(%topic, partition, "kafka partition consumer ready");
        Ok(Self { records })
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn next_record(&mut self) -> Option<Result<Vec<u8>, IngestError>> {
        self.records.next().await
    }
}
