use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Cannot modify {field} of an order in status {status}")]
    FrozenField {
        field: &'static str,
        status: OrderStatus,
    },
}
