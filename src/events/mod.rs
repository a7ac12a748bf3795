// ============================================================================
// Domain Events
// ============================================================================
//
// Envelope, publisher seam and the consumers that turn bus events into
// queued work. Publication is fire-and-forget after the store write.
//
// ============================================================================

pub mod envelope;
pub mod handlers;
pub mod publisher;

pub use envelope::{DomainEvent, EventEnvelope, EVENT_SOURCE};
pub use handlers::{run_bus_consumer, BusError, BusEventHandler};
pub use publisher::{publish_best_effort, EventPublisher, PublishError, RedpandaPublisher};
