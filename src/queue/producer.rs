use async_trait::async_trait;
use std::sync::Arc;

use super::message::QueueMessage;
use crate::messaging::{RedpandaClient, SendError};
use crate::utils::IsTransient;

// ============================================================================
// Queue Producer
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Failed to serialize queue message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Unavailable(#[from] SendError),
}

impl IsTransient for QueueError {
    fn is_transient(&self) -> bool {
        matches!(self, QueueError::Unavailable(_))
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError>;
}

/// Work queue on a Redpanda topic, keyed by message id
pub struct KafkaQueue {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl KafkaQueue {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl MessageQueue for KafkaQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&message)?;
        self.client
            .publish(&self.topic, &message.message_id, &payload)
            .await?;

        tracing::debug!(
            message_id = %message.message_id,
            message_type = %message.message_type,
            topic = %self.topic,
            "Enqueued message"
        );
        Ok(())
    }
}
