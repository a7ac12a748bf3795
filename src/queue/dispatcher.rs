use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::mailer::{MailError, Mailer};
use super::message::{
    EmailMessage, ProcessOrder, QueueMessage, PROCESS_ORDER, PROCESS_ORDER_SCHEMA, SEND_EMAIL,
    SEND_EMAIL_SCHEMA,
};
use crate::errors::ServiceError;
use crate::metrics::Metrics;
use crate::service::{OrderService, PaymentOutcome};
use crate::utils::IsTransient;
use crate::validation::{validate, ValidationFailure};

// ============================================================================
// Queue Dispatch Table
// ============================================================================
//
// Message `type` -> handler. Unknown types are logged and acknowledged so a
// new producer cannot poison the queue for this consumer.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid message payload: {0}")]
    InvalidPayload(#[from] ValidationFailure),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

impl IsTransient for HandlerError {
    /// Worth another delivery; everything else goes straight to dead letter
    fn is_transient(&self) -> bool {
        match self {
            HandlerError::InvalidPayload(_) => false,
            HandlerError::Service(e) => e.is_transient(),
            HandlerError::Mail(_) => true,
        }
    }
}

const UNKNOWN_TYPE_LABEL: &str = "unknown";

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError>;
}

pub struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            handlers: HashMap::new(),
            metrics,
        }
    }

    /// The order service's queue: payment step and notification emails
    pub fn for_orders(service: Arc<OrderService>, mailer: Arc<dyn Mailer>, metrics: Arc<Metrics>) -> Self {
        Self::new(metrics)
            .register(PROCESS_ORDER, Arc::new(ProcessOrderHandler::new(service)))
            .register(SEND_EMAIL, Arc::new(SendEmailHandler::new(mailer)))
    }

    pub fn register(mut self, message_type: &'static str, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(message_type, handler);
        self
    }

    pub async fn dispatch(&self, message: &QueueMessage) -> Result<(), HandlerError> {
        let Some(handler) = self.handlers.get(message.message_type.as_str()) else {
            tracing::warn!(
                message_id = %message.message_id,
                message_type = %message.message_type,
                "Unknown queue message type, acknowledging"
            );
            // Unregistered types come from producers; keep them out of labels
            self.metrics.record_queue_message(UNKNOWN_TYPE_LABEL, "ignored");
            return Ok(());
        };

        let result = handler.handle(message).await;
        let outcome = if result.is_ok() { "processed" } else { "failed" };
        self.metrics
            .record_queue_message(&message.message_type, outcome);
        result
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub struct ProcessOrderHandler {
    service: Arc<OrderService>,
}

impl ProcessOrderHandler {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for ProcessOrderHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError> {
        let payload: ProcessOrder = validate(&PROCESS_ORDER_SCHEMA, &message.data)?;

        match self
            .service
            .process_payment(&payload.order_id, message.correlation())
            .await?
        {
            PaymentOutcome::Processed { payment_id, .. } => {
                tracing::info!(
                    order_id = %payload.order_id,
                    payment_id = %payment_id,
                    "PROCESS_ORDER handled"
                );
            }
            PaymentOutcome::AlreadyProcessed { status } => {
                tracing::info!(
                    order_id = %payload.order_id,
                    status = %status,
                    delivery_attempt = message.delivery_attempt,
                    "PROCESS_ORDER duplicate delivery acknowledged"
                );
            }
        }
        Ok(())
    }
}

pub struct SendEmailHandler {
    mailer: Arc<dyn Mailer>,
}

impl SendEmailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl MessageHandler for SendEmailHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError> {
        let email: EmailMessage = validate(&SEND_EMAIL_SCHEMA, &message.data)?;
        self.mailer.send(&email).await?;
        Ok(())
    }
}
