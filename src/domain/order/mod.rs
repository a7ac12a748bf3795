// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderItem, ShippingAddress, OrderStatus state machine)
// - Entity (Order document with version counter)
// - Requests (validated input shapes and their schemas)
// - Events (ORDER_CREATED, ORDER_UPDATED, ORDER_DELETED, PAYMENT_PROCESSED)
// - Errors (business rule violations)
//
// ============================================================================

pub mod value_objects;
pub mod entity;
pub mod requests;
pub mod events;
pub mod errors;

pub use value_objects::*;
pub use entity::*;
pub use requests::*;
pub use events::*;
pub use errors::*;
