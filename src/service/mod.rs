pub mod order_service;

pub use order_service::{OrderService, PaymentOutcome};
