use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{
    LineItemRecord, OrderInsert, OrderRecord, OrderStore, StoreError, StoreTransaction,
};
use crate::config::DatabaseConfig;
use crate::domain::order::{LineItem, OrderId, OutboxEvent};

// ============================================================================
// Postgres Order Store
// ============================================================================

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL,
        payment_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'created',
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        order_id BIGINT NOT NULL REFERENCES orders (id),
        item_id BIGINT NOT NULL,
        line_no INT NOT NULL,
        original_amount BIGINT NOT NULL CHECK (original_amount > 0),
        discounted_amount BIGINT NOT NULL CHECK (discounted_amount >= 0),
        PRIMARY KEY (order_id, item_id)
    )",
    "CREATE TABLE IF NOT EXISTS outbox (
        event_id UUID PRIMARY KEY,
        order_id BIGINT NOT NULL REFERENCES orders (id),
        sent BOOLEAN NOT NULL DEFAULT FALSE
    )",
    "CREATE INDEX IF NOT EXISTS outbox_pending_idx ON outbox (order_id) WHERE sent = FALSE",
];

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the shared connection pool. Failing here is fatal at startup.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Create the tables the service needs if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Order store schema ensured");
        Ok(())
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    payment_type: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderRecord {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            payment_type: row
                .payment_type
                .parse()
                .map_err(|e| StoreError::CorruptRow(format!("order {}: {}", row.id, e)))?,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::CorruptRow(format!("order {}: {}", row.id, e)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct LineItemRow {
    order_id: i64,
    item_id: i64,
    original_amount: i64,
    discounted_amount: i64,
}

impl From<LineItemRow> for LineItemRecord {
    fn from(row: LineItemRow) -> Self {
        Self {
            order_id: row.order_id,
            item: LineItem {
                item_id: row.item_id,
                original_amount: row.original_amount,
                discounted_amount: row.discounted_amount,
            },
        }
    }
}

#[derive(FromRow)]
struct OutboxRow {
    event_id: Uuid,
    order_id: i64,
    sent: bool,
}

impl From<OutboxRow> for OutboxEvent {
    fn from(row: OutboxRow) -> Self {
        Self {
            event_id: row.event_id,
            order_id: row.order_id,
            sent: row.sent,
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    type Tx = PgStoreTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgStoreTransaction { tx })
    }

    async fn fetch_orders(&self, ids: &[OrderId]) -> Result<Vec<OrderRecord>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, payment_type, status, created_at
             FROM orders
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRecord::try_from).collect()
    }

    async fn fetch_line_items(&self, ids: &[OrderId]) -> Result<Vec<LineItemRecord>, StoreError> {
        let rows: Vec<LineItemRow> = sqlx::query_as(
            "SELECT order_id, item_id, original_amount, discounted_amount
             FROM order_items
             WHERE order_id = ANY($1)
             ORDER BY order_id ASC, line_no ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineItemRecord::from).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Wraps a pooled sqlx transaction. sqlx rolls it back if it is dropped
/// without commit, which covers cancelled futures.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn insert_order(&mut self, order: OrderInsert) -> Result<OrderId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (user_id, payment_type, status, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(order.user_id)
        .bind(order.payment_type.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn insert_line_items(
        &mut self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_items (order_id, item_id, line_no, original_amount, discounted_amount) ",
        );
        builder.push_values(items.iter().enumerate(), |mut row, (line_no, item)| {
            row.push_bind(order_id)
                .push_bind(item.item_id)
                .push_bind(line_no as i32)
                .push_bind(item.original_amount)
                .push_bind(item.discounted_amount);
        });

        builder.build().execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn insert_outbox_event(
        &mut self,
        event_id: Uuid,
        order_id: OrderId,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO outbox (event_id, order_id, sent) VALUES ($1, $2, FALSE)")
            .bind(event_id)
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn lock_pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT event_id, order_id, sent
             FROM outbox
             WHERE sent = FALSE
             ORDER BY order_id ASC, event_id ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(OutboxEvent::from).collect())
    }

    async fn mark_outbox_sent(&mut self, event_ids: &[Uuid]) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE outbox SET sent = TRUE WHERE event_id = ANY($1) AND sent = FALSE",
        )
        .bind(event_ids)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
