use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::MAX_BATCH_SIZE;
use crate::domain::order::{OrderCreated, OrderId, OutboxEvent};
use crate::messaging::{BusError, MessageBus, OutboxMessage};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError, StoreTransaction};

// ============================================================================
// Outbox Publisher - one bounded drain of pending outbox rows per call
// ============================================================================
//
// 1. begin a transaction
// 2. lock up to `batch_size` pending rows, oldest order first
// 3. build one OrderCreated message per row
// 4. publish the batch; on any failure roll back so the same rows are
//    picked up again next cycle
// 5. mark the rows sent and commit
//
// A crash between 4 and 5 leaves the rows pending and they are delivered
// again: delivery is at-least-once and consumers dedupe on event_id.
// Scheduling lives outside (see actors::OutboxScheduler and the
// `publish-outbox` command).
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Begin,
    SelectPending,
    Encode,
    Publish,
    MarkSent,
    Commit,
    Rollback,
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStep::Begin => "begin",
            CycleStep::SelectPending => "select_pending",
            CycleStep::Encode => "encode",
            CycleStep::Publish => "publish",
            CycleStep::MarkSent => "mark_sent",
            CycleStep::Commit => "commit",
            CycleStep::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishCycleError {
    #[error("outbox cycle failed at {step}: {source}")]
    Store {
        step: CycleStep,
        #[source]
        source: StoreError,
    },

    #[error("encoding outbox event {event_id} failed: {source}")]
    Encode {
        event_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("publishing {batch_size} outbox events failed: {source}")]
    Publish {
        batch_size: usize,
        #[source]
        source: BusError,
    },

    #[error("{original}; rollback also failed: {rollback}")]
    RollbackFailed {
        original: Box<PublishCycleError>,
        rollback: StoreError,
    },
}

impl PublishCycleError {
    pub fn step(&self) -> CycleStep {
        match self {
            PublishCycleError::Store { step, .. } => *step,
            PublishCycleError::Encode { .. } => CycleStep::Encode,
            PublishCycleError::Publish { .. } => CycleStep::Publish,
            PublishCycleError::RollbackFailed { original, .. } => original.step(),
        }
    }
}

/// What one successful cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Order ids published, in publish order.
    pub order_ids: Vec<OrderId>,
    /// Rows whose flag this cycle flipped to sent.
    pub marked_sent: u64,
}

impl CycleReport {
    pub fn published(&self) -> usize {
        self.order_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty()
    }
}

pub struct OutboxPublisher<S: OrderStore, B: MessageBus> {
    store: S,
    bus: Arc<B>,
    topic: String,
    batch_size: i64,
    metrics: Arc<Metrics>,
}

impl<S: OrderStore, B: MessageBus> OutboxPublisher<S, B> {
    pub fn new(store: S, bus: Arc<B>, topic: impl Into<String>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
            batch_size: MAX_BATCH_SIZE,
            metrics,
        }
    }

    /// Cap the batch below the default of 100.
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Run exactly one cycle. An empty outbox is a successful no-op.
    pub async fn run_cycle(&self) -> Result<CycleReport, PublishCycleError> {
        let started = Instant::now();
        let result = self.drain_once().await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(report) if report.is_empty() => {
                self.metrics.record_cycle("empty", 0, 0, elapsed);
                tracing::debug!("No pending outbox events");
            }
            Ok(report) => {
                self.metrics
                    .record_cycle("published", report.published(), report.published(), elapsed);
                tracing::info!(
                    published = report.published(),
                    first_order_id = report.order_ids.first().copied(),
                    last_order_id = report.order_ids.last().copied(),
                    "📤 Outbox batch published and marked sent"
                );
            }
            Err(err) => {
                self.metrics.record_cycle("failed", 0, 0, elapsed);
                tracing::error!(error = %err, step = %err.step(), "Outbox cycle failed");
            }
        }

        result
    }

    async fn drain_once(&self) -> Result<CycleReport, PublishCycleError> {
        let mut tx = self.store.begin().await.map_err(|source| PublishCycleError::Store {
            step: CycleStep::Begin,
            source,
        })?;

        match self.publish_locked(&mut tx).await {
            Ok(report) if report.is_empty() => {
                // Nothing locked, nothing written.
                tx.rollback().await.map_err(|source| PublishCycleError::Store {
                    step: CycleStep::Rollback,
                    source,
                })?;
                Ok(report)
            }
            Ok(report) => {
                tx.commit().await.map_err(|source| PublishCycleError::Store {
                    step: CycleStep::Commit,
                    source,
                })?;
                Ok(report)
            }
            Err(err) => Err(abort(tx, err).await),
        }
    }

    async fn publish_locked(&self, tx: &mut S::Tx) -> Result<CycleReport, PublishCycleError> {
        let pending = tx
            .lock_pending_outbox(self.batch_size)
            .await
            .map_err(|source| PublishCycleError::Store {
                step: CycleStep::SelectPending,
                source,
            })?;

        if pending.is_empty() {
            return Ok(CycleReport::default());
        }

        tracing::debug!(batch_size = pending.len(), "Locked pending outbox events");

        let messages = pending
            .iter()
            .map(|event| self.message_for(event))
            .collect::<Result<Vec<_>, _>>()?;

        self.bus
            .publish_batch(&messages)
            .await
            .map_err(|source| PublishCycleError::Publish {
                batch_size: messages.len(),
                source,
            })?;

        let event_ids: Vec<Uuid> = pending.iter().map(|e| e.event_id).collect();
        let marked_sent = tx
            .mark_outbox_sent(&event_ids)
            .await
            .map_err(|source| PublishCycleError::Store {
                step: CycleStep::MarkSent,
                source,
            })?;

        if marked_sent != event_ids.len() as u64 {
            tracing::warn!(
                selected = event_ids.len(),
                marked_sent = marked_sent,
                "Some locked outbox rows were already sent"
            );
        }

        Ok(CycleReport {
            order_ids: pending.iter().map(|e| e.order_id).collect(),
            marked_sent,
        })
    }

    fn message_for(&self, event: &OutboxEvent) -> Result<OutboxMessage, PublishCycleError> {
        let payload = OrderCreated::from(event)
            .to_payload()
            .map_err(|source| PublishCycleError::Encode {
                event_id: event.event_id,
                source,
            })?;

        Ok(OutboxMessage {
            topic: self.topic.clone(),
            key: event.order_id.to_string(),
            payload,
        })
    }
}

async fn abort<T: StoreTransaction>(tx: T, err: PublishCycleError) -> PublishCycleError {
    match tx.rollback().await {
        Ok(()) => err,
        Err(rollback) => PublishCycleError::RollbackFailed {
            original: Box::new(err),
            rollback,
        },
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
