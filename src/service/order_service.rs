use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{
    CreateOrderRequest, ListOrdersQuery, Order, OrderEvent, OrderPatch, OrderStatus,
    PaymentProcessed, UpdateOrderRequest,
};
use crate::errors::ServiceError;
use crate::events::{publish_best_effort, EventEnvelope, EventPublisher};
use crate::metrics::Metrics;
use crate::repository::{OrderFilter, OrderRepository, Page, PageRequest, RepositoryError};
use crate::utils::{retry_on_transient, retry_when, RetryConfig};

// ============================================================================
// Order Service
// ============================================================================
//
// Domain rules on top of the repository:
// - store calls are retried on transient failures only
// - updates run a bounded re-fetch / re-apply loop on version conflicts
// - events are published after the write commits and never undo it
//
// The service holds no entity state; every call reads what it needs.
//
// ============================================================================

/// Result of the payment step driven by `PROCESS_ORDER`
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Processed { order: Order, payment_id: String },
    /// Order had already left `PENDING`; redelivery of a handled message
    AlreadyProcessed { status: OrderStatus },
}

pub struct OrderService {
    repository: Arc<OrderRepository>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    store_retry: RetryConfig,
    conflict_retry: RetryConfig,
}

impl OrderService {
    pub fn new(
        repository: Arc<OrderRepository>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repository,
            publisher,
            metrics,
            store_retry: RetryConfig::store(),
            conflict_retry: RetryConfig::version_conflict(),
        }
    }

    pub fn with_retry_configs(mut self, store_retry: RetryConfig, conflict_retry: RetryConfig) -> Self {
        self.store_retry = store_retry;
        self.conflict_retry = conflict_retry;
        self
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        correlation_id: &str,
    ) -> Result<Order, ServiceError> {
        let order = Order::create(request, Utc::now());

        let saved = self
            .store_call("save", |_| self.repository.save(order.clone()))
            .await?;

        tracing::info!(
            order_id = %saved.order_id,
            customer_id = %saved.customer_id,
            total_amount = saved.total_amount,
            "✅ Order created"
        );

        self.publish(OrderEvent::created(&saved), saved.version, correlation_id)
            .await;
        Ok(saved)
    }

    /// Apply `request.patch`. Without `expected_version` the current version
    /// is read and used; with it, the write is pinned to that version.
    pub async fn update_order(
        &self,
        order_id: &str,
        request: UpdateOrderRequest,
        correlation_id: &str,
    ) -> Result<Order, ServiceError> {
        let UpdateOrderRequest {
            patch,
            expected_version,
        } = request;

        let result = retry_when(
            &self.conflict_retry,
            ServiceError::is_version_conflict,
            |attempt| {
                let patch = patch.clone();
                async move {
                    if attempt > 1 {
                        self.metrics.record_version_conflict("retried");
                        tracing::debug!(
                            order_id = %order_id,
                            attempt = attempt,
                            "Re-fetching order after version conflict"
                        );
                    }
                    self.try_update(order_id, patch, expected_version).await
                }
            },
        )
        .await;

        let (order, previous_status, changes) = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_version_conflict() {
                    self.metrics.record_version_conflict("surfaced");
                    tracing::warn!(
                        order_id = %order_id,
                        expected_version = ?expected_version,
                        "⚠️ Version conflict not resolved within retry bound"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            order_id = %order.order_id,
            version = order.version,
            changes = ?changes,
            "✅ Order updated"
        );

        self.publish(
            OrderEvent::updated(&order, previous_status, changes),
            order.version,
            correlation_id,
        )
        .await;
        Ok(order)
    }

    /// One read-check-write pass of the update loop
    async fn try_update(
        &self,
        order_id: &str,
        patch: OrderPatch,
        pinned_version: Option<i64>,
    ) -> Result<(Order, OrderStatus, Vec<String>), ServiceError> {
        let current = self.load(order_id).await?;

        // Business-rule failures end the loop here, before any write
        current.check_patch(&patch)?;

        let expected = pinned_version.unwrap_or(current.version);
        let previous_status = current.status;
        let changes = current.clone().apply_checked(&patch);

        let updated = self
            .store_call("update_with_version", |_| {
                let patch = patch.clone();
                self.repository.update_with_version(
                    order_id,
                    expected,
                    Box::new(move |order: &mut Order| {
                        order.apply_checked(&patch);
                    }),
                )
            })
            .await?;

        Ok((updated, previous_status, changes))
    }

    /// Hard delete. Deleting a missing order succeeds and publishes nothing.
    ///
    /// The existence check and the delete are separate store calls, so two
    /// deletes racing on the same order can both see it and both publish
    /// `ORDER_DELETED`. Consumers treat the event as idempotent, like every
    /// other best-effort publish.
    pub async fn delete_order(&self, order_id: &str, correlation_id: &str) -> Result<(), ServiceError> {
        let existing = self
            .store_call("find_by_id", |_| self.repository.find_by_id(order_id))
            .await?;

        self.store_call("delete", |_| self.repository.delete(order_id))
            .await?;

        match existing {
            Some(order) => {
                tracing::info!(order_id = %order_id, "🗑️ Order deleted");
                self.publish(OrderEvent::deleted(order_id), order.version, correlation_id)
                    .await;
            }
            None => tracing::debug!(order_id = %order_id, "Delete of missing order, no-op"),
        }
        Ok(())
    }

    /// Payment step for a `PENDING` order: confirm it and announce the
    /// payment. Orders past `PENDING` are reported as already processed.
    pub async fn process_payment(
        &self,
        order_id: &str,
        correlation_id: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        let current = self.load(order_id).await?;
        if current.status != OrderStatus::Pending {
            tracing::info!(
                order_id = %order_id,
                status = %current.status,
                "Payment already handled, skipping"
            );
            return Ok(PaymentOutcome::AlreadyProcessed {
                status: current.status,
            });
        }

        let request = UpdateOrderRequest {
            patch: OrderPatch::status(OrderStatus::Confirmed),
            expected_version: Some(current.version),
        };

        let order = match self.update_order(order_id, request, correlation_id).await {
            Ok(order) => order,
            Err(e) if e.is_version_conflict() => {
                // Another delivery may have confirmed it in the meantime
                let latest = self.load(order_id).await?;
                if latest.status == OrderStatus::Pending {
                    return Err(e);
                }
                return Ok(PaymentOutcome::AlreadyProcessed {
                    status: latest.status,
                });
            }
            Err(e) => return Err(e),
        };

        let payment_id = Uuid::new_v4().to_string();
        let event = OrderEvent::PaymentProcessed(PaymentProcessed {
            order_id: order.order_id.clone(),
            payment_id: payment_id.clone(),
            amount: order.total_amount,
        });

        tracing::info!(
            order_id = %order.order_id,
            payment_id = %payment_id,
            amount = order.total_amount,
            "💳 Payment processed"
        );

        self.publish(event, order.version, correlation_id).await;
        Ok(PaymentOutcome::Processed { order, payment_id })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.load(order_id).await
    }

    pub async fn list_orders(&self, query: ListOrdersQuery) -> Result<Page<Order>, ServiceError> {
        let filter = OrderFilter {
            customer_id: query.customer_id,
            status: query.status,
        };
        let page = PageRequest {
            limit: query.limit,
            next_token: query.next_token,
        };

        let result = self
            .store_call("query", |_| self.repository.query(&filter, &page))
            .await?;
        Ok(result)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn load(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.store_call("find_by_id", |_| self.repository.find_by_id(order_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(order_id.to_string()))
    }

    /// Run a store call under the transient-failure retry policy
    async fn store_call<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, RepositoryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        retry_on_transient(&self.store_retry, |attempt| {
            if attempt > 1 {
                self.metrics.record_retry_attempt(operation);
            }
            call(attempt)
        })
        .await
    }

    async fn publish(&self, event: OrderEvent, version: i64, correlation_id: &str) {
        let envelope = EventEnvelope::new(event, correlation_id).with_version(version);
        publish_best_effort(self.publisher.as_ref(), &self.metrics, envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderItem;
    use crate::errors::ErrorCode;
    use crate::repository::{InMemoryOrderRepository, Repository};
    use crate::test_support::{
        fast_retry, sample_request, FlakyRepository, RacingRepository, RecordingPublisher,
        RejectingRepository,
    };
    use std::time::Duration;

    struct Harness {
        service: OrderService,
        repository: Arc<InMemoryOrderRepository>,
        publisher: Arc<RecordingPublisher>,
    }

    fn harness() -> Harness {
        let repository = Arc::new(InMemoryOrderRepository::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = OrderService::new(
            repository.clone(),
            publisher.clone(),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_retry_configs(fast_retry(), fast_retry());
        Harness {
            service,
            repository,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_create_order_starts_pending_at_version_one() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "corr-1").await.unwrap();

        assert_eq!(order.version, 1);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 20.0);

        let events = h.publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), OrderEvent::ORDER_CREATED);
        assert_eq!(events[0].correlation_id, "corr-1");
        assert_eq!(events[0].aggregate_version, Some(1));
    }

    #[tokio::test]
    async fn test_create_survives_publish_failure() {
        let repository = Arc::new(InMemoryOrderRepository::new());
        let service = OrderService::new(
            repository.clone(),
            Arc::new(RecordingPublisher::failing()),
            Arc::new(Metrics::new().unwrap()),
        );

        let order = service.create_order(sample_request(), "corr").await.unwrap();
        assert!(repository.find_by_id(&order.order_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sequential_updates_advance_version_by_one_each() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();

        let emails = ["a@example.com", "b@example.com", "c@example.com", "d@example.com"];
        for email in emails {
            let request = UpdateOrderRequest {
                patch: OrderPatch {
                    customer_email: Some(email.to_string()),
                    ..OrderPatch::default()
                },
                expected_version: None,
            };
            h.service.update_order(&order.order_id, request, "c").await.unwrap();
        }

        let stored = h.service.get_order(&order.order_id).await.unwrap();
        assert_eq!(stored.version, 1 + emails.len() as i64);
        assert_eq!(stored.customer_email, "d@example.com");
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_never_lost() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();
        let service = Arc::new(h.service);

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let service = service.clone();
            let id = order.order_id.clone();
            tasks.spawn(async move {
                let request = UpdateOrderRequest {
                    patch: OrderPatch {
                        customer_email: Some(format!("user{}@example.com", i)),
                        ..OrderPatch::default()
                    },
                    expected_version: None,
                };
                service.update_order(&id, request, "c").await
            });
        }

        let mut succeeded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert_eq!(e.code(), ErrorCode::VersionConflict),
            }
        }

        let stored = h.repository.find_by_id(&order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1 + succeeded);
    }

    #[tokio::test]
    async fn test_stale_expected_version_surfaces_conflict_after_bound() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();
        h.service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Confirmed),
                    expected_version: Some(1),
                },
                "c",
            )
            .await
            .unwrap();

        let err = h
            .service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Shipped),
                    expected_version: Some(1),
                },
                "c",
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::VersionConflict);
        let text = h.service.metrics().render().unwrap();
        assert!(text.contains("version_conflicts_total{outcome=\"retried\"} 2"));
        assert!(text.contains("version_conflicts_total{outcome=\"surfaced\"} 1"));

        let stored = h.service.get_order(&order.order_id).await.unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unpinned_update_recovers_from_racing_writer() {
        let inner = Arc::new(InMemoryOrderRepository::new());
        let racing = Arc::new(RacingRepository::new(inner.clone(), 1));
        let service = OrderService::new(
            racing.clone(),
            Arc::new(RecordingPublisher::default()),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_retry_configs(fast_retry(), fast_retry());

        let order = service.create_order(sample_request(), "c").await.unwrap();
        let updated = service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Confirmed),
                    expected_version: None,
                },
                "c",
            )
            .await
            .unwrap();

        // One racing write landed first, then ours on top of it
        assert_eq!(updated.version, 3);
        assert_eq!(updated.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_invalid_transition_does_not_retry() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();
        h.service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Cancelled),
                    expected_version: Some(1),
                },
                "c",
            )
            .await
            .unwrap();

        let err = h
            .service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Confirmed),
                    expected_version: None,
                },
                "c",
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::InvalidTransition);
        assert_eq!(err.status(), 422);
        let text = h.service.metrics().render().unwrap();
        assert!(!text.contains("version_conflicts_total{outcome=\"retried\"}"));
    }

    #[tokio::test]
    async fn test_item_edit_recomputes_total_and_reports_changes() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();

        let items = vec![OrderItem {
            product_id: "p2".into(),
            name: "Gadget".into(),
            quantity: 3,
            price: 2.5,
        }];
        let updated = h
            .service
            .update_order(
                &order.order_id,
                UpdateOrderRequest {
                    patch: OrderPatch {
                        items: Some(items),
                        ..OrderPatch::default()
                    },
                    expected_version: Some(1),
                },
                "c",
            )
            .await
            .unwrap();

        assert_eq!(updated.total_amount, 7.5);
        let events = h.publisher.events();
        match &events[1].event {
            OrderEvent::OrderUpdated(e) => {
                assert_eq!(e.changes, vec!["items".to_string()]);
                assert_eq!(e.previous_status, OrderStatus::Pending);
                assert!(!e.status_changed());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_order_is_not_found() {
        let h = harness();
        let err = h
            .service
            .update_order(
                "missing",
                UpdateOrderRequest {
                    patch: OrderPatch::status(OrderStatus::Confirmed),
                    expected_version: None,
                },
                "c",
            )
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NotFound("missing".into()));
    }

    #[tokio::test]
    async fn test_delete_twice_succeeds_and_publishes_once() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();

        h.service.delete_order(&order.order_id, "c").await.unwrap();
        h.service.delete_order(&order.order_id, "c").await.unwrap();

        assert_eq!(
            h.publisher.event_types(),
            vec![OrderEvent::ORDER_CREATED, OrderEvent::ORDER_DELETED]
        );
        assert_eq!(
            h.service.get_order(&order.order_id).await.unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn test_concurrent_deletes_both_succeed() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();

        let (first, second) = tokio::join!(
            h.service.delete_order(&order.order_id, "c1"),
            h.service.delete_order(&order.order_id, "c2"),
        );
        assert!(first.is_ok() && second.is_ok());

        // One or two ORDER_DELETED, never zero
        let deleted = h
            .publisher
            .event_types()
            .into_iter()
            .filter(|t| *t == OrderEvent::ORDER_DELETED)
            .count();
        assert!((1..=2).contains(&deleted));
        assert!(h.repository.find_by_id(&order.order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let inner = Arc::new(InMemoryOrderRepository::new());
        let flaky = Arc::new(FlakyRepository::new(inner.clone(), 2));
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(
            flaky.clone(),
            Arc::new(RecordingPublisher::default()),
            metrics.clone(),
        )
        .with_retry_configs(fast_retry(), fast_retry());

        let order = service.create_order(sample_request(), "c").await.unwrap();
        assert_eq!(inner.len().await, 1);
        assert_eq!(order.version, 1);
        assert!(metrics
            .render()
            .unwrap()
            .contains("retry_attempts_total{operation=\"save\"} 2"));
    }

    #[tokio::test]
    async fn test_exhausted_transient_failures_surface_as_store_unavailable() {
        let inner = Arc::new(InMemoryOrderRepository::new());
        let flaky = Arc::new(FlakyRepository::new(inner, 10));
        let service = OrderService::new(
            flaky,
            Arc::new(RecordingPublisher::default()),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_retry_configs(
            RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            fast_retry(),
        );

        let err = service.get_order("any").await.unwrap_err();
        assert!(matches!(err, ServiceError::StoreUnavailable(_)));
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_store_rejection_is_not_retried() {
        let rejecting = Arc::new(RejectingRepository::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = OrderService::new(rejecting.clone(), publisher.clone(), metrics.clone())
            .with_retry_configs(fast_retry(), fast_retry());

        let err = service.create_order(sample_request(), "c").await.unwrap_err();

        assert_eq!(rejecting.calls(), 1);
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(!err.is_transient());
        assert!(publisher.events().is_empty());
        assert!(!metrics.render().unwrap().contains("retry_attempts_total{"));
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_customer() {
        let h = harness();
        h.service.create_order(sample_request(), "c").await.unwrap();
        let mut other = sample_request();
        other.customer_id = "someone-else".into();
        h.service.create_order(other, "c").await.unwrap();

        let page = h
            .service
            .list_orders(ListOrdersQuery {
                customer_id: Some("cust-1".into()),
                status: None,
                limit: 20,
                next_token: None,
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].customer_id, "cust-1");
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_process_payment_confirms_once() {
        let h = harness();
        let order = h.service.create_order(sample_request(), "c").await.unwrap();

        let first = h.service.process_payment(&order.order_id, "c").await.unwrap();
        match first {
            PaymentOutcome::Processed { order, .. } => {
                assert_eq!(order.status, OrderStatus::Confirmed);
                assert_eq!(order.version, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let second = h.service.process_payment(&order.order_id, "c").await.unwrap();
        assert_eq!(
            second,
            PaymentOutcome::AlreadyProcessed {
                status: OrderStatus::Confirmed
            }
        );
        assert_eq!(
            h.publisher.event_types(),
            vec![
                OrderEvent::ORDER_CREATED,
                OrderEvent::ORDER_UPDATED,
                OrderEvent::PAYMENT_PROCESSED
            ]
        );
    }
}
