use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::envelope::EventEnvelope;
use crate::domain::order::{Order, OrderEvent, OrderUpdated};
use crate::queue::{EmailMessage, MessageQueue, QueueError, QueueMessage};
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Bus Event Handlers
// ============================================================================
//
// Consumers of the order events topic. Each event tag maps to a reaction
// that decides which queue messages to enqueue; tags without a reaction
// (including ones this build does not know) are logged and skipped.
//
// ============================================================================

type Reaction = fn(&EventEnvelope<OrderEvent>) -> Vec<QueueMessage>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct BusEventHandler {
    reactions: HashMap<&'static str, Reaction>,
    queue: Arc<dyn MessageQueue>,
    retry: RetryConfig,
}

impl BusEventHandler {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        let mut reactions: HashMap<&'static str, Reaction> = HashMap::new();
        reactions.insert(OrderEvent::ORDER_CREATED, on_order_created);
        reactions.insert(OrderEvent::ORDER_UPDATED, on_order_updated);

        Self {
            reactions,
            queue,
            retry: RetryConfig::default(),
        }
    }

    /// Handle one raw bus payload; returns how many messages were enqueued
    pub async fn handle_raw(&self, payload: &[u8]) -> Result<usize, BusError> {
        let value: Value = serde_json::from_slice(payload)?;
        let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();

        if !self.reactions.contains_key(event_type) {
            tracing::debug!(event_type = %event_type, "No reaction for event, skipping");
            return Ok(0);
        }

        let envelope: EventEnvelope<OrderEvent> = serde_json::from_value(value)?;
        Ok(self.handle(&envelope).await?)
    }

    pub async fn handle(&self, envelope: &EventEnvelope<OrderEvent>) -> Result<usize, QueueError> {
        let Some(reaction) = self.reactions.get(envelope.event_type()) else {
            tracing::debug!(event_type = envelope.event_type(), "No reaction for event, skipping");
            return Ok(0);
        };

        let messages = reaction(envelope);
        let count = messages.len();

        for message in messages {
            tracing::info!(
                event_id = %envelope.event_id,
                order_id = %envelope.aggregate_id,
                message_type = %message.message_type,
                "📥 Enqueueing work for event"
            );
            retry_on_transient(&self.retry, |_| self.queue.enqueue(message.clone())).await?;
        }

        Ok(count)
    }
}

fn on_order_created(envelope: &EventEnvelope<OrderEvent>) -> Vec<QueueMessage> {
    let OrderEvent::OrderCreated(created) = &envelope.event else {
        return Vec::new();
    };

    vec![
        QueueMessage::process_order(&created.order.order_id)
            .with_correlation_id(&envelope.correlation_id),
        QueueMessage::send_email(&confirmation_email(&created.order))
            .with_correlation_id(&envelope.correlation_id),
    ]
}

fn on_order_updated(envelope: &EventEnvelope<OrderEvent>) -> Vec<QueueMessage> {
    match &envelope.event {
        OrderEvent::OrderUpdated(updated) if updated.status_changed() => {
            vec![QueueMessage::send_email(&status_email(updated))
                .with_correlation_id(&envelope.correlation_id)]
        }
        _ => Vec::new(),
    }
}

fn confirmation_email(order: &Order) -> EmailMessage {
    EmailMessage {
        to: order.customer_email.clone(),
        subject: format!("Order {} received", order.order_id),
        body: format!(
            "Thanks for your order. {} item(s), total {:.2}. We'll let you know when it ships to {}, {}.",
            order.items.len(),
            order.total_amount,
            order.shipping_address.street,
            order.shipping_address.city,
        ),
    }
}

fn status_email(updated: &OrderUpdated) -> EmailMessage {
    EmailMessage {
        to: updated.order.customer_email.clone(),
        subject: format!("Order {} is now {}", updated.order.order_id, updated.order.status),
        body: format!(
            "Your order {} changed from {} to {}.",
            updated.order.order_id, updated.previous_status, updated.order.status
        ),
    }
}

/// Consume the events topic until `shutdown` resolves. Failures are logged
/// and the offset still advances: reactions are best-effort like the
/// publish that produced the event.
pub async fn run_bus_consumer(
    consumer: StreamConsumer,
    handler: Arc<BusEventHandler>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);
    tracing::info!("🚀 Bus event consumer started");
    let poll_backoff = RetryConfig::consumer_poll();
    let mut receive_errors: u32 = 0;

    loop {
        let received = tokio::select! {
            _ = &mut shutdown => break,
            received = consumer.recv() => received,
        };

        let message = match received {
            Ok(message) => {
                receive_errors = 0;
                message
            }
            Err(e) => {
                receive_errors = receive_errors.saturating_add(1);
                let delay = poll_backoff.delay_for(receive_errors);
                tracing::error!(
                    error = %e,
                    consecutive_failures = receive_errors,
                    delay_ms = delay.as_millis() as u64,
                    "Error receiving bus event, backing off"
                );
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        };

        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
            tracing::warn!(error = %e, "Failed to commit bus event offset");
        }
        drop(message);

        if let Err(e) = handler.handle_raw(&payload).await {
            tracing::error!(error = %e, "❌ Failed to react to bus event");
        }
    }

    tracing::info!("Bus event consumer stopped");
    Ok(())
}
