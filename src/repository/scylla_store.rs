use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::response::{PagingState, PagingStateResponse};
use scylla::statement::unprepared::Statement;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;

use super::{Mutator, OrderFilter, Page, PageRequest, Repository, RepositoryError, Versioned};
use crate::domain::order::{Order, OrderStatus};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// One row per order. Conditional writes use lightweight transactions:
// - save:                INSERT ... IF NOT EXISTS
// - update_with_version: UPDATE ... IF version = ?
// so the version check and the write are a single Paxos round on the
// coordinator. Items and address are stored as JSON text columns.
// Listing uses secondary indexes on customer_id and status and hands the
// driver paging state back to callers hex-encoded.
//
// ============================================================================

const SELECT_COLUMNS: &str = "order_id, version, customer_id, customer_email, items, \
     shipping_address, status, total_amount, created_at, updated_at";

type OrderRow = (
    String,
    i64,
    String,
    String,
    String,
    String,
    String,
    f64,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub struct ScyllaOrderRepository {
    session: Arc<Session>,
}

impl ScyllaOrderRepository {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Create keyspace objects if missing; the session must already use the
    /// target keyspace.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS orders (
                order_id text PRIMARY KEY,
                version bigint,
                customer_id text,
                customer_email text,
                items text,
                shipping_address text,
                status text,
                total_amount double,
                created_at timestamp,
                updated_at timestamp
            )",
            "CREATE INDEX IF NOT EXISTS orders_customer_id_idx ON orders (customer_id)",
            "CREATE INDEX IF NOT EXISTS orders_status_idx ON orders (status)",
        ];

        for cql in statements {
            self.session.query_unpaged(cql, &[]).await?;
        }

        tracing::info!("Orders table and indexes ready");
        Ok(())
    }

    fn to_row(order: &Order) -> Result<OrderRow, RepositoryError> {
        let items = serde_json::to_string(&order.items).map_err(rejected)?;
        let address = serde_json::to_string(&order.shipping_address).map_err(rejected)?;
        Ok((
            order.order_id.clone(),
            order.version,
            order.customer_id.clone(),
            order.customer_email.clone(),
            items,
            address,
            order.status.as_str().to_string(),
            order.total_amount,
            order.created_at,
            order.updated_at,
        ))
    }

    fn from_row(row: OrderRow) -> Result<Order, RepositoryError> {
        let (
            order_id,
            version,
            customer_id,
            customer_email,
            items,
            address,
            status,
            total_amount,
            created_at,
            updated_at,
        ) = row;

        let status = OrderStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Rejected(format!("unknown status '{}'", status)))?;

        Ok(Order {
            order_id,
            version,
            customer_id,
            customer_email,
            items: serde_json::from_str(&items).map_err(rejected)?,
            shipping_address: serde_json::from_str(&address).map_err(rejected)?,
            status,
            total_amount,
            created_at,
            updated_at,
        })
    }
}

fn unavailable(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Unavailable(e.to_string())
}

fn rejected(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Rejected(e.to_string())
}

/// Read `[applied]` and, when the row still exists, its current version from
/// an LWT result. `[applied]` is always the first column; the position of
/// `version` depends on what the coordinator echoes back.
fn lwt_outcome(row: &Row, version_index: Option<usize>) -> (bool, Option<i64>) {
    let applied = row
        .columns
        .first()
        .and_then(|c| c.as_ref())
        .and_then(CqlValue::as_boolean)
        .unwrap_or(false);
    let version = version_index
        .and_then(|i| row.columns.get(i))
        .and_then(|c| c.as_ref())
        .and_then(CqlValue::as_bigint);
    (applied, version)
}

fn decode_token(token: &str) -> Result<Vec<u8>, RepositoryError> {
    hex::decode(token).map_err(|e| RepositoryError::Rejected(format!("malformed page token: {}", e)))
}

#[async_trait]
impl Repository for ScyllaOrderRepository {
    type Id = str;
    type Entity = Order;
    type Filter = OrderFilter;

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        let cql = format!("SELECT {} FROM orders WHERE order_id = ?", SELECT_COLUMNS);
        let result = self
            .session
            .query_unpaged(cql, (id,))
            .await
            .map_err(unavailable)?;

        let rows_result = result.into_rows_result().map_err(rejected)?;
        match rows_result.maybe_first_row::<OrderRow>().map_err(rejected)? {
            Some(row) => Ok(Some(Self::from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entity: Order) -> Result<Order, RepositoryError> {
        let row = Self::to_row(&entity)?;
        let cql = format!(
            "INSERT INTO orders ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            SELECT_COLUMNS
        );

        let result = self
            .session
            .query_unpaged(cql, row)
            .await
            .map_err(unavailable)?;
        let rows_result = result.into_rows_result().map_err(rejected)?;
        let outcome = rows_result.first_row::<Row>().map_err(rejected)?;

        let (applied, _) = lwt_outcome(&outcome, None);
        if !applied {
            return Err(RepositoryError::AlreadyExists(entity.order_id.clone()));
        }

        tracing::debug!(order_id = %entity.order_id, "Inserted order row");
        Ok(entity)
    }

    async fn update_with_version(
        &self,
        id: &str,
        expected_version: i64,
        mutator: Mutator<Order>,
    ) -> Result<Order, RepositoryError> {
        let stored = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        if stored.version() != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: Some(stored.version()),
            });
        }

        let mut next = stored;
        mutator(&mut next);
        next.advance(Utc::now());

        let items = serde_json::to_string(&next.items).map_err(rejected)?;
        let address = serde_json::to_string(&next.shipping_address).map_err(rejected)?;

        // The IF clause is the authoritative check; the read above only
        // avoids a round trip for versions already known to be stale.
        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET version = ?, customer_email = ?, items = ?, \
                 shipping_address = ?, status = ?, total_amount = ?, updated_at = ? \
                 WHERE order_id = ? IF version = ?",
                (
                    next.version,
                    next.customer_email.as_str(),
                    items,
                    address,
                    next.status.as_str(),
                    next.total_amount,
                    next.updated_at,
                    id,
                    expected_version,
                ),
            )
            .await
            .map_err(unavailable)?;

        let rows_result = result.into_rows_result().map_err(rejected)?;
        let version_index = rows_result
            .column_specs()
            .get_by_name("version")
            .map(|(index, _)| index);
        let outcome = rows_result.first_row::<Row>().map_err(rejected)?;

        match lwt_outcome(&outcome, version_index) {
            (true, _) => {
                tracing::debug!(
                    order_id = %id,
                    version = next.version,
                    "Conditional update applied"
                );
                Ok(next)
            }
            (false, None) => Err(RepositoryError::NotFound(id.to_string())),
            (false, actual) => Err(RepositoryError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual,
            }),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.session
            .query_unpaged("DELETE FROM orders WHERE order_id = ?", (id,))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn query(
        &self,
        filter: &OrderFilter,
        page: &PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(customer_id) = &filter.customer_id {
            conditions.push("customer_id = ?");
            values.push(customer_id.clone());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.as_str().to_string());
        }

        let mut cql = format!("SELECT {} FROM orders", SELECT_COLUMNS);
        if !conditions.is_empty() {
            cql.push_str(" WHERE ");
            cql.push_str(&conditions.join(" AND "));
        }
        if conditions.len() > 1 {
            cql.push_str(" ALLOW FILTERING");
        }

        let mut statement = Statement::new(cql);
        statement.set_page_size(page.limit.clamp(1, i32::MAX as u32) as i32);

        let paging_state = match &page.next_token {
            Some(token) => PagingState::new_from_raw_bytes(decode_token(token)?),
            None => PagingState::start(),
        };

        let (result, paging_response) = self
            .session
            .query_single_page(statement, values, paging_state)
            .await
            .map_err(unavailable)?;

        let rows_result = result.into_rows_result().map_err(rejected)?;
        let mut items = Vec::new();
        for row in rows_result.rows::<OrderRow>().map_err(rejected)? {
            items.push(Self::from_row(row.map_err(rejected)?)?);
        }

        let next_token = match paging_response {
            PagingStateResponse::HasMorePages { state } => {
                state.as_bytes_slice().map(hex::encode)
            }
            PagingStateResponse::NoMorePages => None,
        };

        Ok(Page { items, next_token })
    }
}
