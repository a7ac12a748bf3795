use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Event Envelope - common metadata around every published domain event
// ============================================================================

pub const EVENT_SOURCE: &str = "order-service";

/// Domain events carried by an envelope
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Wire tag, e.g. `ORDER_CREATED`
    fn event_type(&self) -> &'static str;

    /// Identifier of the entity the event is about (partition key)
    fn aggregate_id(&self) -> &str;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: String,
    /// Entity version the event was derived from, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_version: Option<i64>,

    // Correlation (for log tracing across services)
    pub correlation_id: String,
    pub source: String,

    // Timing
    pub timestamp: DateTime<Utc>,

    // Tagged payload: `type` + `data`
    #[serde(flatten)]
    pub event: E,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(event: E, correlation_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id().to_string(),
            aggregate_version: None,
            correlation_id: correlation_id.into(),
            source: EVENT_SOURCE.to_string(),
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.aggregate_version = Some(version);
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}
