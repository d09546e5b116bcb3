//! External log ingestion.
//!
//! A [`RecordSource`] yields raw records, a [`RecordDecoder`] turns the ones
//! that look like traffic into edges and node names, and [`run`] publishes
//! them through the hub. A bad record never stops the feed.

pub mod kafka;
pub mod schema;

use async_trait::async_trait;
use flowly_core::config::KafkaConfig;
use flowly_hub::Broadcaster;
use flowly_protocol::Message;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::IngestError;
pub use kafka::KafkaSource;
pub use schema::{decoder_for, DecodedRecord, RecordDecoder};

/// A sequential feed of raw records.
#[async_trait]
pub trait RecordSource: Send {
    /// Next record, an error for one failed fetch, or `None` once the feed ends.
    async fn next_record(&mut self) -> Option<Result<Vec<u8>, IngestError>>;
}

/// Counters returned when the feed ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records: u64,
    /// Records rejected by the prefilter.
    pub ignored: u64,
    pub failed: u64,
    pub published: u64,
    /// Entries dropped inside otherwise valid records.
    pub skipped: u64,
}

/// Consume `source` until it ends or `shutdown` fires.
pub async fn run<S, B>(
    mut source: S,
    decoder: &dyn RecordDecoder,
    hub: &B,
    mut shutdown: watch::Receiver<bool>,
) -> IngestStats
where
    S: RecordSource,
    B: Broadcaster,
{
    let mut stats = IngestStats::default();
    loop {
        let next = tokio::select! {
            next = source.next_record() => next,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("ingestion shutting down");
                    break;
                }
                continue;
            }
        };

        let record = match next {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!(error = %e, "external log fetch failed");
                continue;
            }
            None => {
                info!("external log feed ended");
                break;
            }
        };

        stats.records += 1;
        debug!(bytes = record.len(), "got record");

        if !decoder.accepts(&record) {
            stats.ignored += 1;
            continue;
        }

        let decoded = match decoder.decode(&record) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(schema = ?decoder.schema(), error = %e, "skipping record");
                stats.failed += 1;
                continue;
            }
        };

        stats.skipped += decoded.skipped;
        publish(hub, decoded).await;
        stats.published += 1;
    }
    stats
}

/// One traffic frame per record, plus a mapping frame when names were found.
async fn publish<B: Broadcaster>(hub: &B, decoded: DecodedRecord) {
    let traffic = Message::traffic(decoded.pings);
    if let Err(e) = hub.broadcast_message(&traffic).await {
        warn!(error = %e, "could not broadcast traffic");
    }

    if !decoded.names.is_empty() {
        let mapping = Message::Mapping {
            mapping: decoded.names,
        };
        if let Err(e) = hub.broadcast_message(&mapping).await {
            warn!(error = %e, "could not broadcast mapping");
        }
    }
}

/// Connect to Kafka and start the ingestion task.
///
/// Connection errors are returned so the caller can abort startup.
pub async fn start<B>(
    config: &KafkaConfig,
    hub: B,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<IngestStats>, IngestError>
where
    B: Broadcaster + 'static,
{
    let topic = config
        .topic
        .clone()
        .ok_or_else(|| IngestError::Connect("no topic configured".to_string()))?;
    let source = KafkaSource::connect(config.brokers(), &topic, config.partition).await?;
    let decoder = decoder_for(config.schema);
    info!(%topic, schema = ?config.schema, "consuming external log");

    Ok(tokio::spawn(async move {
        let stats = run(source, decoder.as_ref(), &hub, shutdown).await;
        info!(?stats, "ingestion finished");
        stats
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;
    use flowly_core::config::RecordSchema;
    use flowly_protocol::Edge;
    use std::collections::VecDeque;

    struct VecSource(VecDeque<Result<Vec<u8>, IngestError>>);

    impl VecSource {
        fn new(items: Vec<Result<&str, IngestError>>) -> Self {
            Self(
                items
                    .into_iter()
                    .map(|r| r.map(|s| s.as_bytes().to_vec()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl RecordSource for VecSource {
        async fn next_record(&mut self) -> Option<Result<Vec<u8>, IngestError>> {
            self.0.pop_front()
        }
    }

    const GOOD: &str = r#"{"DurationInMillis": 500, "ServicePackages": [
        {"Source": {"Name": "lb", "IP": "10.0.0.1"}, "Destination": {"Name": "", "IP": "10.0.0.2"}, "Len": 2}
    ]}"#;
    const NAMELESS: &str = r#"{"DurationInMillis": 500, "ServicePackages": [
        {"Source": {"IP": "10.0.0.3"}, "Destination": {"IP": "10.0.0.4"}, "Len": 1},
        {"Source": null, "Destination": {"IP": "10.0.0.4"}, "Len": 1}
    ]}"#;

    #[tokio::test]
    async fn bad_records_do_not_stop_the_feed() {
        let source = VecSource::new(vec![
            Ok(r#"{"heartbeat": 1}"#),
            Ok(r#"{"Source": broken"#),
            Err(IngestError::Source("fetch timed out".to_string())),
            Ok(GOOD),
            Ok(NAMELESS),
        ]);
        let recorder = Recorder::default();
        let (_tx, rx) = watch::channel(false);
        let decoder = decoder_for(RecordSchema::Endpoint);

        let stats = run(source, decoder.as_ref(), &recorder, rx).await;

        assert_eq!(
            stats,
            IngestStats {
                records: 4,
                ignored: 1,
                failed: 1,
                published: 2,
                skipped: 1,
            }
        );

        let messages = recorder.messages();
        assert_eq!(
            messages,
            vec![
                Message::traffic(vec![Edge::new("10_0_0_1", "10_0_0_2", 2, 500)]),
                Message::mapping([("10_0_0_1", "lb")]),
                Message::traffic(vec![Edge::new("10_0_0_3", "10_0_0_4", 1, 500)]),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_a_pending_feed() {
        struct Pending;

        #[async_trait]
        impl RecordSource for Pending {
            async fn next_record(&mut self) -> Option<Result<Vec<u8>, IngestError>> {
                std::future::pending().await
            }
        }

        let recorder = Recorder::default();
        let (tx, rx) = watch::channel(false);
        let decoder = decoder_for(RecordSchema::Capture);
        let task = tokio::spawn(async move { run(Pending, decoder.as_ref(), &recorder, rx).await });

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats, IngestStats::default());
    }
}
