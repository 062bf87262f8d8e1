use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{NewOrder, OrderDraft, OrderId, ValidationError};
use crate::metrics::Metrics;
use crate::store::{OrderInsert, OrderStore, StoreError, StoreTransaction};

// ============================================================================
// Order Writer - "create order + enqueue outbox event" in one transaction
// ============================================================================
//
// 1. insert the order header, the store assigns the id
// 2. insert every line item against that id
// 3. generate an event id and insert a pending outbox row
// 4. commit
//
// Any failure rolls the whole transaction back: no order, no items, no
// outbox row. Nothing is retried here; retrying is up to the client.
//
// ============================================================================

/// Source of globally unique outbox event ids.
pub trait EventIdSource: Send + Sync {
    fn next_event_id(&self) -> Result<Uuid, StoreError>;
}

/// Random (v4) UUIDs.
pub struct RandomEventIds;

impl EventIdSource for RandomEventIds {
    fn next_event_id(&self) -> Result<Uuid, StoreError> {
        Ok(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Begin,
    InsertOrder,
    InsertLineItems,
    GenerateEventId,
    InsertOutboxEvent,
    Commit,
}

impl WriteStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStep::Begin => "begin",
            WriteStep::InsertOrder => "insert_order",
            WriteStep::InsertLineItems => "insert_line_items",
            WriteStep::GenerateEventId => "generate_event_id",
            WriteStep::InsertOutboxEvent => "insert_outbox_event",
            WriteStep::Commit => "commit",
        }
    }
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateOrderError {
    #[error("invalid order: {0}")]
    Invalid(#[from] ValidationError),

    #[error("create order failed at {step}: {source}")]
    Store {
        step: WriteStep,
        #[source]
        source: StoreError,
    },

    #[error("{original}; rollback also failed: {rollback}")]
    RollbackFailed {
        original: Box<CreateOrderError>,
        rollback: StoreError,
    },
}

impl CreateOrderError {
    /// The step a store failure happened at, if any.
    pub fn step(&self) -> Option<WriteStep> {
        match self {
            CreateOrderError::Invalid(_) => None,
            CreateOrderError::Store { step, .. } => Some(*step),
            CreateOrderError::RollbackFailed { original, .. } => original.step(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CreateOrderError::Invalid(_))
    }
}

pub struct OrderWriter<S: OrderStore> {
    store: S,
    event_ids: Arc<dyn EventIdSource>,
    metrics: Arc<Metrics>,
}

impl<S: OrderStore> OrderWriter<S> {
    pub fn new(store: S, metrics: Arc<Metrics>) -> Self {
        Self::with_event_ids(store, Arc::new(RandomEventIds), metrics)
    }

    pub fn with_event_ids(store: S, event_ids: Arc<dyn EventIdSource>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            event_ids,
            metrics,
        }
    }

    /// Validate the draft, then persist it together with its outbox event.
    /// Returns the store-assigned order id.
    pub async fn create_order(&self, draft: OrderDraft) -> Result<OrderId, CreateOrderError> {
        let order = draft.validate().map_err(|e| {
            tracing::warn!(error = %e, "Rejected invalid order");
            e
        })?;

        match self.persist(&order).await {
            Ok((order_id, event_id)) => {
                self.metrics.record_order_created();
                tracing::info!(
                    order_id = order_id,
                    event_id = %event_id,
                    user_id = order.user_id(),
                    item_count = order.items().len(),
                    "✅ Order persisted with pending outbox event"
                );
                Ok(order_id)
            }
            Err(err) => {
                let step = err.step().map(|s| s.as_str()).unwrap_or("unknown");
                self.metrics.record_order_failure(step);
                tracing::error!(error = %err, step = step, "Failed to create order");
                Err(err)
            }
        }
    }

    async fn persist(&self, order: &NewOrder) -> Result<(OrderId, Uuid), CreateOrderError> {
        let mut tx = self.store.begin().await.map_err(|source| CreateOrderError::Store {
            step: WriteStep::Begin,
            source,
        })?;

        match self.write(&mut tx, order).await {
            Ok(ids) => {
                tx.commit().await.map_err(|source| CreateOrderError::Store {
                    step: WriteStep::Commit,
                    source,
                })?;
                Ok(ids)
            }
            Err(err) => Err(abort(tx, err).await),
        }
    }

    async fn write(
        &self,
        tx: &mut S::Tx,
        order: &NewOrder,
    ) -> Result<(OrderId, Uuid), CreateOrderError> {
        let at = |step: WriteStep| move |source: StoreError| CreateOrderError::Store { step, source };

        let order_id = tx
            .insert_order(OrderInsert {
                user_id: order.user_id(),
                payment_type: order.payment_type(),
                status: order.status(),
                created_at: Utc::now(),
            })
            .await
            .map_err(at(WriteStep::InsertOrder))?;

        tx.insert_line_items(order_id, order.items())
            .await
            .map_err(at(WriteStep::InsertLineItems))?;

        let event_id = self
            .event_ids
            .next_event_id()
            .map_err(at(WriteStep::GenerateEventId))?;

        tx.insert_outbox_event(event_id, order_id)
            .await
            .map_err(at(WriteStep::InsertOutboxEvent))?;

        tracing::debug!(order_id = order_id, event_id = %event_id, "Order staged, committing");
        Ok((order_id, event_id))
    }
}

/// Roll back after a failed step, keeping both errors if the rollback fails too.
async fn abort<T: StoreTransaction>(tx: T, err: CreateOrderError) -> CreateOrderError {
    match tx.rollback().await {
        Ok(()) => err,
        Err(rollback) => CreateOrderError::RollbackFailed {
            original: Box::new(err),
            rollback,
        },
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
