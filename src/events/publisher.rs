use async_trait::async_trait;
use std::sync::Arc;

use super::envelope::EventEnvelope;
use crate::domain::order::OrderEvent;
use crate::messaging::RedpandaClient;
use crate::metrics::Metrics;

// ============================================================================
// Event Publisher
// ============================================================================
//
// Maps domain events to bus messages. Callers on the write path go through
// `publish_best_effort`, which never fails: a publish error is logged and
// counted, and the already-committed store write stands.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event bus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, envelope: &EventEnvelope<OrderEvent>) -> Result<(), PublishError>;
}

/// Publishes envelopes as JSON to a Redpanda topic keyed by order id, so
/// events for one order land on one partition in publish order.
pub struct RedpandaPublisher {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl RedpandaPublisher {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl EventPublisher for RedpandaPublisher {
    async fn publish(&self, envelope: &EventEnvelope<OrderEvent>) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(envelope)?;

        self.client
            .publish(&self.topic, &envelope.aggregate_id, &payload)
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        tracing::info!(
            event_id = %envelope.event_id,
            event_type = envelope.event_type(),
            order_id = %envelope.aggregate_id,
            topic = %self.topic,
            "📤 Published domain event"
        );
        Ok(())
    }
}

/// Publish without letting a failure reach the caller
pub async fn publish_best_effort(
    publisher: &dyn EventPublisher,
    metrics: &Metrics,
    envelope: EventEnvelope<OrderEvent>,
) {
    let event_type = envelope.event_type();

    match publisher.publish(&envelope).await {
        Ok(()) => metrics.record_publish(event_type, true),
        Err(e) => {
            metrics.record_publish(event_type, false);
            tracing::error!(
                error = %e,
                event_id = %envelope.event_id,
                event_type = event_type,
                order_id = %envelope.aggregate_id,
                correlation_id = %envelope.correlation_id,
                "❌ Failed to publish domain event, write already committed"
            );
        }
    }
}
