// ============================================================================
// Order Store - durable system of record
// ============================================================================
//
// Tables: orders, order_items, outbox.
//
// Components never share a transaction. Each unit of work calls `begin()`,
// uses the returned transaction, and ends it with `commit()` or
// `rollback()`. Dropping an unfinished transaction (e.g. when the caller's
// future is cancelled by a timeout) rolls it back.
//
// ============================================================================

mod postgres;
#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::{LineItem, OrderId, OrderStatus, OutboxEvent, PaymentType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("event id generation failed: {0}")]
    EventId(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                StoreError::Constraint(db.message().to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Order header row as stored, before line items are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: i64,
    pub payment_type: PaymentType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Line item row together with the order it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemRecord {
    pub order_id: OrderId,
    pub item: LineItem,
}

/// Insert data for the orders table.
#[derive(Debug, Clone, Copy)]
pub struct OrderInsert {
    pub user_id: i64,
    pub payment_type: PaymentType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    /// Acquire a connection and open a transaction on it.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Order headers for the given ids; unknown ids are simply absent.
    async fn fetch_orders(&self, ids: &[OrderId]) -> Result<Vec<OrderRecord>, StoreError>;

    /// Line items of the given orders, in insertion order per order.
    async fn fetch_line_items(&self, ids: &[OrderId]) -> Result<Vec<LineItemRecord>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait StoreTransaction: Send + Sized {
    /// Insert the order header and return the identity the store assigned.
    async fn insert_order(&mut self, order: OrderInsert) -> Result<OrderId, StoreError>;

    async fn insert_line_items(
        &mut self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<(), StoreError>;

    /// Insert a pending (sent = false) outbox row.
    async fn insert_outbox_event(
        &mut self,
        event_id: Uuid,
        order_id: OrderId,
    ) -> Result<(), StoreError>;

    /// Select up to `limit` pending outbox rows, oldest order first, and lock
    /// them for the rest of this transaction. Rows locked by another open
    /// transaction are skipped.
    async fn lock_pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError>;

    /// Flip `sent` to true for the given rows. Rows already sent are left
    /// alone. Returns the number of rows changed.
    async fn mark_outbox_sent(&mut self, event_ids: &[Uuid]) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
