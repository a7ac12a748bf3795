//! Fixtures and test doubles shared by the unit tests

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::order::{CreateOrderRequest, Order, OrderEvent, OrderItem, ShippingAddress};
use crate::events::{EventEnvelope, EventPublisher, PublishError};
use crate::queue::{EmailMessage, MailError, Mailer, MessageQueue, QueueError, QueueMessage};
use crate::repository::{
    InMemoryOrderRepository, Mutator, OrderFilter, Page, PageRequest, Repository, RepositoryError,
};
use crate::utils::RetryConfig;

// ============================================================================
// Fixtures
// ============================================================================

pub fn sample_request() -> CreateOrderRequest {
    CreateOrderRequest {
        customer_id: "cust-1".to_string(),
        customer_email: "jane@example.com".to_string(),
        items: vec![OrderItem {
            product_id: "p1".to_string(),
            name: "Widget".to_string(),
            quantity: 2,
            price: 10.00,
        }],
        shipping_address: ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            postal_code: "62701".to_string(),
        },
    }
}

/// Wire form of `sample_request()`
pub fn create_order_json() -> Value {
    json!({
        "customerId": "cust-1",
        "customerEmail": "jane@example.com",
        "items": [{ "productId": "p1", "name": "Widget", "quantity": 2, "price": 10.00 }],
        "shippingAddress": {
            "street": "1 Main St",
            "city": "Springfield",
            "state": "IL",
            "postalCode": "62701"
        }
    })
}

/// Fresh `PENDING` order with a new id
pub fn sample_order(customer_id: &str) -> Order {
    let mut request = sample_request();
    request.customer_id = customer_id.to_string();
    Order::create(request, Utc::now())
}

/// Same attempt cap as production, millisecond delays
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

// ============================================================================
// Recording doubles
// ============================================================================

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<EventEnvelope<OrderEvent>>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<EventEnvelope<OrderEvent>> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, envelope: &EventEnvelope<OrderEvent>) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Unavailable("bus down".to_string()));
        }
        self.events.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<QueueMessage>>,
}

impl RecordingQueue {
    pub fn messages(&self) -> Vec<QueueMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &EmailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

// ============================================================================
// Repository wrappers
// ============================================================================

/// Fails the first `failures` calls of any kind with `Unavailable`
pub struct FlakyRepository {
    inner: Arc<InMemoryOrderRepository>,
    remaining: AtomicU32,
}

impl FlakyRepository {
    pub fn new(inner: Arc<InMemoryOrderRepository>, failures: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(failures),
        }
    }

    fn trip(&self) -> Result<(), RepositoryError> {
        let tripped = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(RepositoryError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    type Id = str;
    type Entity = Order;
    type Filter = OrderFilter;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        self.trip()?;
        self.inner.find_by_id(id).await
    }

    async fn save(&self, entity: Order) -> Result<Order, RepositoryError> {
        self.trip()?;
        self.inner.save(entity).await
    }

    async fn update_with_version(
        &self,
        id: &str,
        expected_version: i64,
        mutator: Mutator<Order>,
    ) -> Result<Order, RepositoryError> {
        self.trip()?;
        self.inner.update_with_version(id, expected_version, mutator).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.trip()?;
        self.inner.delete(id).await
    }

    async fn query(&self, filter: &OrderFilter, page: &PageRequest) -> Result<Page<Order>, RepositoryError> {
        self.trip()?;
        self.inner.query(filter, page).await
    }
}

/// Lands a competing no-op write just before each of the first `races`
/// conditional writes, so they see a version that moved underneath them.
pub struct RacingRepository {
    inner: Arc<InMemoryOrderRepository>,
    races: AtomicU32,
}

impl RacingRepository {
    pub fn new(inner: Arc<InMemoryOrderRepository>, races: u32) -> Self {
        Self {
            inner,
            races: AtomicU32::new(races),
        }
    }
}

#[async_trait]
impl Repository for RacingRepository {
    type Id = str;
    type Entity = Order;
    type Filter = OrderFilter;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, entity: Order) -> Result<Order, RepositoryError> {
        self.inner.save(entity).await
    }

    async fn update_with_version(
        &self,
        id: &str,
        expected_version: i64,
        mutator: Mutator<Order>,
    ) -> Result<Order, RepositoryError> {
        let race = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if race {
            if let Some(current) = self.inner.find_by_id(id).await? {
                self.inner
                    .update_with_version(id, current.version, Box::new(|_: &mut Order| {}))
                    .await?;
            }
        }
        self.inner.update_with_version(id, expected_version, mutator).await
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }

    async fn query(&self, filter: &OrderFilter, page: &PageRequest) -> Result<Page<Order>, RepositoryError> {
        self.inner.query(filter, page).await
    }
}

/// Rejects every call permanently and counts how often it was asked
#[derive(Default)]
pub struct RejectingRepository {
    calls: AtomicU32,
}

impl RejectingRepository {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn reject<T>(&self) -> Result<T, RepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RepositoryError::Rejected("malformed key".to_string()))
    }
}

#[async_trait]
impl Repository for RejectingRepository {
    type Id = str;
    type Entity = Order;
    type Filter = OrderFilter;

    async fn find_by_id(&self, _id: &str) -> Result<Option<Order>, RepositoryError> {
        self.reject()
    }

    async fn save(&self, _entity: Order) -> Result<Order, RepositoryError> {
        self.reject()
    }

    async fn update_with_version(
        &self,
        _id: &str,
        _expected_version: i64,
        _mutator: Mutator<Order>,
    ) -> Result<Order, RepositoryError> {
        self.reject()
    }

    async fn delete(&self, _id: &str) -> Result<(), RepositoryError> {
        self.reject()
    }

    async fn query(&self, _filter: &OrderFilter, _page: &PageRequest) -> Result<Page<Order>, RepositoryError> {
        self.reject()
    }
}
