use rdkafka::{
    config::ClientConfig,
    consumer::{Consumer, StreamConsumer},
    producer::{FutureProducer, FutureRecord},
};
use anyhow::Context;
use std::time::Duration;

// ============================================================================
// Redpanda Client - Kafka-protocol producer shared by the event bus
// publisher and the work queue producer
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("Kafka send to '{topic}' failed: {reason}")]
pub struct SendError {
    pub topic: String,
    pub reason: String,
}

pub struct RedpandaClient {
    producer: FutureProducer,
    brokers: String,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("allow.auto.create.topics", "true")
            .create()
            .context("Failed to create Redpanda producer")?;

        tracing::info!(brokers = %brokers, "Redpanda producer created");

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            send_timeout: Duration::from_secs(5),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SendError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, rdkafka::util::Timeout::After(self.send_timeout))
            .await
        {
            Ok(_) => {
                tracing::debug!(topic = %topic, key = %key, "Published to Redpanda");
                Ok(())
            }
            Err((e, _)) => {
                tracing::error!(error = %e, topic = %topic, key = %key, "Failed to publish to Redpanda");
                Err(SendError {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Build a consumer on the same cluster; offsets are committed manually
    pub fn consumer(&self, group_id: &str, topics: &[&str]) -> anyhow::Result<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group_id)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("allow.auto.create.topics", "true")
            .create()
            .context("Failed to create Redpanda consumer")?;

        consumer
            .subscribe(topics)
            .with_context(|| format!("Failed to subscribe to {:?}", topics))?;

        tracing::info!(group_id = %group_id, topics = ?topics, "Redpanda consumer subscribed");
        Ok(consumer)
    }
}
