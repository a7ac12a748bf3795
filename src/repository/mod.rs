use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::{Order, OrderStatus};

// ============================================================================
// Repository Abstraction
// ============================================================================
//
// Generic keyed store contract with an optimistic-locking update primitive.
// `update_with_version` must check the stored version and write in one
// atomic step at the store boundary; implementations advance the version
// by exactly one on every successful write.
//
// ============================================================================

mod error;
mod memory;
mod scylla_store;

pub use error::RepositoryError;
pub use memory::InMemoryOrderRepository;
pub use scylla_store::ScyllaOrderRepository;

/// Entities that carry an optimistic-locking version
pub trait Versioned: Clone + Send + Sync + 'static {
    fn key(&self) -> &str;
    fn version(&self) -> i64;
    /// Bump the version by one and stamp the modification time
    fn advance(&mut self, at: DateTime<Utc>);
}

/// In-place change applied to the stored entity inside the conditional write
pub type Mutator<T> = Box<dyn FnOnce(&mut T) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub limit: u32,
    /// Opaque token returned by the previous page
    pub next_token: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 20,
            next_token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    type Id: ?Sized + Send + Sync;
    type Entity: Versioned;
    type Filter: Send + Sync;

    async fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>, RepositoryError>;

    /// Unconditional create; fails with `AlreadyExists` on a taken key
    async fn save(&self, entity: Self::Entity) -> Result<Self::Entity, RepositoryError>;

    /// Conditional write: `VersionConflict` if the stored version is not
    /// `expected_version` at write time, `NotFound` if nothing is stored.
    async fn update_with_version(
        &self,
        id: &Self::Id,
        expected_version: i64,
        mutator: Mutator<Self::Entity>,
    ) -> Result<Self::Entity, RepositoryError>;

    /// Idempotent: deleting a missing key succeeds
    async fn delete(&self, id: &Self::Id) -> Result<(), RepositoryError>;

    async fn query(
        &self,
        filter: &Self::Filter,
        page: &PageRequest,
    ) -> Result<Page<Self::Entity>, RepositoryError>;
}

// ============================================================================
// Order bindings
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.customer_id
            .as_deref()
            .map_or(true, |c| c == order.customer_id)
            && self.status.map_or(true, |s| s == order.status)
    }
}

pub type OrderRepository =
    dyn Repository<Id = str, Entity = Order, Filter = OrderFilter>;

impl Versioned for Order {
    fn key(&self) -> &str {
        &self.order_id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn advance(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = at;
    }
}
