use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::message::QueueMessage;
use super::worker::{BatchReport, BatchWorker, FailedMessage};
use crate::config::QueueConfig;
use crate::messaging::RedpandaClient;
use crate::utils::RetryConfig;

// ============================================================================
// Queue Runner - Redpanda consumer loop around the batch worker
// ============================================================================
//
// 1. Block for the first message, then drain up to `batch_size` more with a
//    short linger.
// 2. Process the batch.
// 3. Failed messages are re-published to the retry topic with their
//    delivery attempt bumped, or to the dead-letter topic once the attempt
//    cap is hit or the failure is permanent.
// 4. Commit offsets; nothing is lost because every failure was re-published
//    before the commit.
//
// ============================================================================

const BATCH_LINGER: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureRoute {
    Retry,
    DeadLetter,
}

/// Where a failed message goes next
pub fn route_failure(message: &QueueMessage, failure: &FailedMessage, max_deliveries: u32) -> FailureRoute {
    if failure.retryable && message.delivery_attempt < max_deliveries {
        FailureRoute::Retry
    } else {
        FailureRoute::DeadLetter
    }
}

pub struct QueueRunner {
    consumer: StreamConsumer,
    client: Arc<RedpandaClient>,
    worker: BatchWorker,
    config: QueueConfig,
    poll_backoff: RetryConfig,
    receive_errors: AtomicU32,
}

impl QueueRunner {
    pub fn new(client: Arc<RedpandaClient>, worker: BatchWorker, config: QueueConfig) -> anyhow::Result<Self> {
        let consumer = client.consumer(
            &config.group_id,
            &[config.topic.as_str(), config.retry_topic.as_str()],
        )?;

        Ok(Self {
            consumer,
            client,
            worker,
            config,
            poll_backoff: RetryConfig::consumer_poll(),
            receive_errors: AtomicU32::new(0),
        })
    }

    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        tokio::pin!(shutdown);
        tracing::info!(
            topic = %self.config.topic,
            retry_topic = %self.config.retry_topic,
            dlq_topic = %self.config.dlq_topic,
            batch_size = self.config.batch_size,
            "🚀 Queue runner started"
        );

        loop {
            let batch = tokio::select! {
                _ = &mut shutdown => break,
                batch = self.next_batch() => batch,
            };

            if batch.is_empty() {
                continue;
            }

            let by_id: HashMap<String, QueueMessage> = batch
                .iter()
                .map(|m| (m.message_id.clone(), m.clone()))
                .collect();

            let report = self.worker.process(batch).await;
            self.reroute_failures(&report, &by_id).await;

            if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Async) {
                tracing::warn!(error = %e, "Offset commit failed, batch may be redelivered");
            }
        }

        tracing::info!("Queue runner stopped");
        Ok(())
    }

    async fn next_batch(&self) -> Vec<QueueMessage> {
        let mut batch = Vec::new();

        while batch.len() < self.config.batch_size {
            let received = if batch.is_empty() {
                self.consumer.recv().await
            } else {
                match tokio::time::timeout(BATCH_LINGER, self.consumer.recv()).await {
                    Ok(received) => received,
                    Err(_) => break,
                }
            };

            // Copy the payload out so the borrowed message never spans an await
            let received =
                received.map(|message| message.payload().map(<[u8]>::to_vec).unwrap_or_default());
            let raw = match received {
                Ok(raw) => {
                    self.receive_errors.store(0, Ordering::Relaxed);
                    raw
                }
                Err(e) => {
                    let failures = self
                        .receive_errors
                        .fetch_add(1, Ordering::Relaxed)
                        .saturating_add(1);
                    let delay = self.poll_backoff.delay_for(failures);
                    tracing::error!(
                        error = %e,
                        consecutive_failures = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Error receiving queue message, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    break;
                }
            };

            match serde_json::from_slice::<QueueMessage>(&raw) {
                Ok(message) => batch.push(message),
                Err(e) => {
                    tracing::error!(error = %e, "Unparsable queue message, dead-lettering");
                    self.dead_letter_raw(&raw).await;
                }
            }
        }

        batch
    }

    async fn reroute_failures(&self, report: &BatchReport, by_id: &HashMap<String, QueueMessage>) {
        for failure in &report.failed {
            let Some(message) = by_id.get(&failure.message_id) else {
                continue;
            };

            let route = route_failure(message, failure, self.config.max_deliveries);
            let (topic, outgoing) = match route {
                FailureRoute::Retry => (&self.config.retry_topic, message.redelivery()),
                FailureRoute::DeadLetter => (&self.config.dlq_topic, message.clone()),
            };

            let payload = match serde_json::to_vec(&outgoing) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, message_id = %message.message_id, "Failed to encode message");
                    continue;
                }
            };

            match self.client.publish(topic, &outgoing.message_id, &payload).await {
                Ok(()) if route == FailureRoute::DeadLetter => tracing::error!(
                    message_id = %outgoing.message_id,
                    message_type = %outgoing.message_type,
                    delivery_attempt = outgoing.delivery_attempt,
                    reason = %failure.reason,
                    "💀 Message moved to dead-letter topic"
                ),
                Ok(()) => tracing::warn!(
                    message_id = %outgoing.message_id,
                    delivery_attempt = outgoing.delivery_attempt,
                    "🔄 Message scheduled for redelivery"
                ),
                Err(e) => tracing::error!(
                    error = %e,
                    message_id = %outgoing.message_id,
                    "Failed to re-publish failed message"
                ),
            }
        }
    }

    async fn dead_letter_raw(&self, raw: &[u8]) {
        if let Err(e) = self.client.publish(&self.config.dlq_topic, "unparsable", raw).await {
            tracing::error!(error = %e, "Failed to dead-letter unparsable message");
        }
    }
}
