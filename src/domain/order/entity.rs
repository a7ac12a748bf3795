use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::requests::{CreateOrderRequest, OrderPatch};
use super::value_objects::{OrderItem, OrderStatus, ShippingAddress};

// ============================================================================
// Order Entity
// ============================================================================
//
// Stored as a single document keyed by `order_id`. `version` starts at 1 and
// grows by exactly one on every successful mutation; the repository is the
// only place that advances it.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub order_id: String,
    pub version: i64,

    // Current State
    pub customer_id: String,
    pub customer_email: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub total_amount: f64,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a fresh `PENDING` order at version 1 from a validated request
    pub fn create(request: CreateOrderRequest, now: DateTime<Utc>) -> Self {
        let total_amount = total_of(&request.items);
        Self {
            order_id: Uuid::new_v4().to_string(),
            version: 1,
            customer_id: request.customer_id,
            customer_email: request.customer_email,
            items: request.items,
            shipping_address: request.shipping_address,
            status: OrderStatus::Pending,
            total_amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check business rules for `patch` against the current state.
    pub fn check_patch(&self, patch: &OrderPatch) -> Result<(), OrderError> {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(OrderError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        if self.status != OrderStatus::Pending {
            if patch.items.is_some() {
                return Err(OrderError::FrozenField {
                    field: "items",
                    status: self.status,
                });
            }
            if patch.shipping_address.is_some() {
                return Err(OrderError::FrozenField {
                    field: "shippingAddress",
                    status: self.status,
                });
            }
        }

        if self.status.is_terminal() && patch.customer_email.is_some() {
            return Err(OrderError::FrozenField {
                field: "customerEmail",
                status: self.status,
            });
        }

        Ok(())
    }

    /// Apply `patch` in place and return the names of fields that changed.
    /// Version and timestamps are left to the repository.
    pub fn apply_patch(&mut self, patch: &OrderPatch) -> Result<Vec<String>, OrderError> {
        self.check_patch(patch)?;
        Ok(self.apply_checked(patch))
    }

    /// Apply a patch already accepted by `check_patch` against this state
    pub fn apply_checked(&mut self, patch: &OrderPatch) -> Vec<String> {
        let mut changes = Vec::new();

        if let Some(status) = patch.status {
            if status != self.status {
                self.status = status;
                changes.push("status".to_string());
            }
        }

        if let Some(items) = &patch.items {
            if *items != self.items {
                self.items = items.clone();
                self.total_amount = total_of(&self.items);
                changes.push("items".to_string());
            }
        }

        if let Some(address) = &patch.shipping_address {
            if *address != self.shipping_address {
                self.shipping_address = address.clone();
                changes.push("shippingAddress".to_string());
            }
        }

        if let Some(email) = &patch.customer_email {
            if *email != self.customer_email {
                self.customer_email = email.clone();
                changes.push("customerEmail".to_string());
            }
        }

        changes
    }
}

/// Sum of line totals rounded to cents
pub fn total_of(items: &[OrderItem]) -> f64 {
    let total: f64 = items.iter().map(OrderItem::line_total).sum();
    (total * 100.0).round() / 100.0
}
