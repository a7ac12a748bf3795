use serde::{Deserialize, Serialize};

use super::entity::Order;
use super::value_objects::OrderStatus;
use crate::events::DomainEvent;

// ============================================================================
// Order Events - facts derived from successful order mutations
// ============================================================================

/// Wire form: `{ "type": "ORDER_CREATED", "data": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderUpdated(OrderUpdated),
    OrderDeleted(OrderDeleted),
    PaymentProcessed(PaymentProcessed),
}

impl OrderEvent {
    pub const ORDER_CREATED: &'static str = "ORDER_CREATED";
    pub const ORDER_UPDATED: &'static str = "ORDER_UPDATED";
    pub const ORDER_DELETED: &'static str = "ORDER_DELETED";
    pub const PAYMENT_PROCESSED: &'static str = "PAYMENT_PROCESSED";

    pub fn created(order: &Order) -> Self {
        OrderEvent::OrderCreated(OrderCreated { order: order.clone() })
    }

    pub fn updated(order: &Order, previous_status: OrderStatus, changes: Vec<String>) -> Self {
        OrderEvent::OrderUpdated(OrderUpdated {
            order: order.clone(),
            previous_status,
            changes,
        })
    }

    pub fn deleted(order_id: &str) -> Self {
        OrderEvent::OrderDeleted(OrderDeleted {
            order_id: order_id.to_string(),
        })
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => Self::ORDER_CREATED,
            OrderEvent::OrderUpdated(_) => Self::ORDER_UPDATED,
            OrderEvent::OrderDeleted(_) => Self::ORDER_DELETED,
            OrderEvent::PaymentProcessed(_) => Self::PAYMENT_PROCESSED,
        }
    }

    fn aggregate_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated(e) => &e.order.order_id,
            OrderEvent::OrderUpdated(e) => &e.order.order_id,
            OrderEvent::OrderDeleted(e) => &e.order_id,
            OrderEvent::PaymentProcessed(e) => &e.order_id,
        }
    }
}

// ============================================================================
// Individual Event Payloads
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order: Order,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdated {
    pub order: Order,
    pub previous_status: OrderStatus,
    /// Names of the fields the update changed
    pub changes: Vec<String>,
}

impl OrderUpdated {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.order.status
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderDeleted {
    pub order_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProcessed {
    pub order_id: String,
    pub payment_id: String,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_format() {
        let event = OrderEvent::deleted("o-1");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "ORDER_DELETED");
        assert_eq!(json["data"]["orderId"], "o-1");
        assert_eq!(event.event_type(), OrderEvent::ORDER_DELETED);
        assert_eq!(event.aggregate_id(), "o-1");
    }

    #[test]
    fn test_payment_event_deserializes() {
        let json = serde_json::json!({
            "type": "PAYMENT_PROCESSED",
            "data": { "orderId": "o-9", "paymentId": "pay-1", "amount": 12.5 }
        });

        let event: OrderEvent = serde_json::from_value(json).unwrap();
        match event {
            OrderEvent::PaymentProcessed(p) => {
                assert_eq!(p.order_id, "o-9");
                assert_eq!(p.amount, 12.5);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
