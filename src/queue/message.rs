use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::validation::{Field, Kind, Schema};

// ============================================================================
// Queue Messages
// ============================================================================
//
// Wire form: `{ "messageId", "type", "data", "correlationId"?,
// "deliveryAttempt" }`. Only `type` and `data` are required from producers;
// the id and attempt counter are filled in on first read.
//
// ============================================================================

pub const PROCESS_ORDER: &str = "PROCESS_ORDER";
pub const SEND_EMAIL: &str = "SEND_EMAIL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    #[serde(default = "new_message_id")]
    pub message_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// 1 on first delivery, incremented on every redelivery
    #[serde(default = "first_delivery")]
    pub delivery_attempt: u32,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

fn first_delivery() -> u32 {
    1
}

impl QueueMessage {
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_id: new_message_id(),
            message_type: message_type.into(),
            data,
            correlation_id: None,
            delivery_attempt: first_delivery(),
        }
    }

    pub fn process_order(order_id: &str) -> Self {
        Self::new(PROCESS_ORDER, serde_json::json!({ "orderId": order_id }))
    }

    pub fn send_email(email: &EmailMessage) -> Self {
        Self::new(
            SEND_EMAIL,
            serde_json::json!({
                "to": email.to,
                "subject": email.subject,
                "body": email.body,
            }),
        )
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Same message, next delivery attempt
    pub fn redelivery(&self) -> Self {
        Self {
            delivery_attempt: self.delivery_attempt + 1,
            ..self.clone()
        }
    }

    /// Correlation id for logs and emitted events; falls back to the message id
    pub fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(&self.message_id)
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOrder {
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub static PROCESS_ORDER_SCHEMA: Schema = Schema {
    name: "ProcessOrder",
    fields: &[Field::required("orderId", Kind::non_empty_string())],
    refine: None,
};

pub static SEND_EMAIL_SCHEMA: Schema = Schema {
    name: "SendEmail",
    fields: &[
        Field::required("to", Kind::email()),
        Field::required("subject", Kind::non_empty_string()),
        Field::required("body", Kind::non_empty_string()),
    ],
    refine: None,
};
