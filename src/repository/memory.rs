use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use super::{Mutator, OrderFilter, Page, PageRequest, Repository, RepositoryError, Versioned};
use crate::domain::order::Order;

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Stand-in for the document store in tests and local runs. The version
// check and the write happen under one write-lock acquisition, which gives
// the same atomicity a conditional write gives at a real store boundary.
// Page tokens are the last key of the previous page.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<BTreeMap<String, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl Repository for InMemoryOrderRepository {
    type Id = str;
    type Entity = Order;
    type Filter = OrderFilter;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn save(&self, entity: Order) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(entity.key()) {
            return Err(RepositoryError::AlreadyExists(entity.key().to_string()));
        }
        orders.insert(entity.key().to_string(), entity.clone());
        Ok(entity)
    }

    async fn update_with_version(
        &self,
        id: &str,
        expected_version: i64,
        mutator: Mutator<Order>,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if stored.version() != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: Some(stored.version()),
            });
        }

        let mut next = stored.clone();
        mutator(&mut next);
        next.advance(Utc::now());
        *stored = next.clone();

        Ok(next)
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.orders.write().await.remove(id);
        Ok(())
    }

    async fn query(
        &self,
        filter: &OrderFilter,
        page: &PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        if page.limit == 0 {
            return Err(RepositoryError::Rejected("page limit must be positive".to_string()));
        }

        let orders = self.orders.read().await;
        let start = match &page.next_token {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };

        let limit = page.limit as usize;
        let mut matched: Vec<Order> = orders
            .range((start, Bound::Unbounded))
            .map(|(_, order)| order)
            .filter(|order| filter.matches(order))
            .take(limit + 1)
            .cloned()
            .collect();

        let next_token = if matched.len() > limit {
            matched.truncate(limit);
            matched.last().map(|o| o.order_id.clone())
        } else {
            None
        };

        Ok(Page {
            items: matched,
            next_token,
        })
    }
}
