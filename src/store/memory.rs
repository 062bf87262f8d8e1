use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    LineItemRecord, OrderInsert, OrderRecord, OrderStore, StoreError, StoreTransaction,
};
use crate::domain::order::{LineItem, OrderId, OutboxEvent};

// ============================================================================
// In-Memory Order Store (tests only)
// ============================================================================
//
// Mirrors the Postgres transaction contract closely enough to exercise the
// writer and publisher without a database:
// - writes are staged in the transaction and applied on commit
// - ids come from a shared sequence (gaps on rollback, like BIGSERIAL)
// - primary keys are enforced on orders, (order_id, item_id) and event_id
// - pending rows are locked FOR UPDATE SKIP LOCKED style
// - locks are released on commit, rollback and drop
// - any operation can be made to fail once
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    InsertOrder,
    InsertLineItems,
    InsertOutbox,
    LockPending,
    MarkSent,
    Commit,
    Rollback,
}

#[derive(Default)]
struct State {
    next_order_id: OrderId,
    orders: BTreeMap<OrderId, OrderRecord>,
    line_items: Vec<LineItemRecord>,
    outbox: BTreeMap<Uuid, OutboxEvent>,
    locked: HashSet<Uuid>,
    sent_marks: HashMap<Uuid, u32>,
    fail_points: HashSet<FailPoint>,
}

impl State {
    fn trip(&mut self, point: FailPoint) -> Result<(), StoreError> {
        if self.fail_points.remove(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next call at `point` fail with `StoreError::Unavailable`.
    pub fn fail_once(&self, point: FailPoint) {
        self.lock().fail_points.insert(point);
    }

    /// Commit an order and a pending outbox row directly, bypassing the writer.
    pub fn seed_pending(&self, order_id: OrderId) -> Uuid {
        let mut state = self.lock();
        let event_id = Uuid::new_v4();
        state.orders.insert(
            order_id,
            OrderRecord {
                id: order_id,
                user_id: 1,
                payment_type: crate::domain::order::PaymentType::Card,
                status: crate::domain::order::OrderStatus::Created,
                created_at: chrono::Utc::now(),
            },
        );
        state.next_order_id = state.next_order_id.max(order_id);
        state.outbox.insert(
            event_id,
            OutboxEvent {
                event_id,
                order_id,
                sent: false,
            },
        );
        event_id
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn line_items_of(&self, order_id: OrderId) -> Vec<LineItem> {
        self.lock()
            .line_items
            .iter()
            .filter(|r| r.order_id == order_id)
            .map(|r| r.item.clone())
            .collect()
    }

    pub fn line_item_count(&self) -> usize {
        self.lock().line_items.len()
    }

    pub fn outbox_rows(&self) -> Vec<OutboxEvent> {
        self.lock().outbox.values().cloned().collect()
    }

    pub fn outbox_for(&self, order_id: OrderId) -> Vec<OutboxEvent> {
        self.lock()
            .outbox
            .values()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().outbox.values().filter(|e| !e.sent).count()
    }

    /// How many committed transactions flipped this row to sent.
    pub fn sent_marks(&self, event_id: Uuid) -> u32 {
        self.lock().sent_marks.get(&event_id).copied().unwrap_or(0)
    }

    pub fn locked_count(&self) -> usize {
        self.lock().locked.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.lock().trip(FailPoint::Begin)?;
        Ok(InMemoryTransaction {
            state: self.state.clone(),
            orders: Vec::new(),
            line_items: Vec::new(),
            outbox: Vec::new(),
            locked: HashSet::new(),
            mark_sent: Vec::new(),
        })
    }

    async fn fetch_orders(&self, ids: &[OrderId]) -> Result<Vec<OrderRecord>, StoreError> {
        let state = self.lock();
        Ok(ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.orders.get(id).cloned())
            .collect())
    }

    async fn fetch_line_items(&self, ids: &[OrderId]) -> Result<Vec<LineItemRecord>, StoreError> {
        let state = self.lock();
        Ok(state
            .line_items
            .iter()
            .filter(|r| ids.contains(&r.order_id))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().trip(FailPoint::Begin)
    }
}

pub struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    orders: Vec<OrderRecord>,
    line_items: Vec<LineItemRecord>,
    outbox: Vec<OutboxEvent>,
    locked: HashSet<Uuid>,
    mark_sent: Vec<Uuid>,
}

impl InMemoryTransaction {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_locks(&mut self) {
        let locked = std::mem::take(&mut self.locked);
        let mut state = self.state();
        for event_id in locked {
            state.locked.remove(&event_id);
        }
    }

    fn order_visible(&self, state: &State, order_id: OrderId) -> bool {
        state.orders.contains_key(&order_id) || self.orders.iter().any(|o| o.id == order_id)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: OrderInsert) -> Result<OrderId, StoreError> {
        let id = {
            let mut state = self.state();
            state.trip(FailPoint::InsertOrder)?;
            state.next_order_id += 1;
            state.next_order_id
        };

        self.orders.push(OrderRecord {
            id,
            user_id: order.user_id,
            payment_type: order.payment_type,
            status: order.status,
            created_at: order.created_at,
        });
        Ok(id)
    }

    async fn insert_line_items(
        &mut self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<(), StoreError> {
        let mut staged = Vec::with_capacity(items.len());
        {
            let mut state = self.state();
            state.trip(FailPoint::InsertLineItems)?;

            if !self.order_visible(&state, order_id) {
                return Err(StoreError::Constraint(format!(
                    "order_items.order_id {} references a missing order",
                    order_id
                )));
            }

            for item in items {
                let duplicate = state
                    .line_items
                    .iter()
                    .chain(self.line_items.iter())
                    .chain(staged.iter())
                    .any(|r: &LineItemRecord| {
                        r.order_id == order_id && r.item.item_id == item.item_id
                    });
                if duplicate {
                    return Err(StoreError::Constraint(format!(
                        "duplicate key (order_id, item_id) = ({}, {})",
                        order_id, item.item_id
                    )));
                }
                staged.push(LineItemRecord {
                    order_id,
                    item: item.clone(),
                });
            }
        }

        self.line_items.extend(staged);
        Ok(())
    }

    async fn insert_outbox_event(
        &mut self,
        event_id: Uuid,
        order_id: OrderId,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.state();
            state.trip(FailPoint::InsertOutbox)?;

            if !self.order_visible(&state, order_id) {
                return Err(StoreError::Constraint(format!(
                    "outbox.order_id {} references a missing order",
                    order_id
                )));
            }
            if state.outbox.contains_key(&event_id)
                || self.outbox.iter().any(|e| e.event_id == event_id)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate key event_id = {}",
                    event_id
                )));
            }
        }

        self.outbox.push(OutboxEvent {
            event_id,
            order_id,
            sent: false,
        });
        Ok(())
    }

    async fn lock_pending_outbox(&mut self, limit: i64) -> Result<Vec<OutboxEvent>, StoreError> {
        let selected = {
            let mut state = self.state();
            state.trip(FailPoint::LockPending)?;

            let mut pending: Vec<OutboxEvent> = state
                .outbox
                .values()
                .filter(|e| !e.sent && !state.locked.contains(&e.event_id))
                .cloned()
                .collect();
            pending.sort_by_key(|e| (e.order_id, e.event_id));
            pending.truncate(limit.max(0) as usize);

            for event in &pending {
                state.locked.insert(event.event_id);
            }
            pending
        };

        self.locked.extend(selected.iter().map(|e| e.event_id));
        Ok(selected)
    }

    async fn mark_outbox_sent(&mut self, event_ids: &[Uuid]) -> Result<u64, StoreError> {
        let pending = {
            let mut state = self.state();
            state.trip(FailPoint::MarkSent)?;
            event_ids
                .iter()
                .filter(|id| state.outbox.get(*id).is_some_and(|e| !e.sent))
                .copied()
                .collect::<Vec<_>>()
        };

        let changed = pending.len() as u64;
        self.mark_sent.extend(pending);
        Ok(changed)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        {
            let shared = self.state.clone();
            let mut state = shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.trip(FailPoint::Commit)?;

            for order in self.orders.drain(..) {
                state.orders.insert(order.id, order);
            }
            state.line_items.append(&mut self.line_items);
            for event in self.outbox.drain(..) {
                state.outbox.insert(event.event_id, event);
            }
            for event_id in self.mark_sent.drain(..) {
                if let Some(event) = state.outbox.get_mut(&event_id) {
                    if !event.sent {
                        event.sent = true;
                        *state.sent_marks.entry(event_id).or_insert(0) += 1;
                    }
                }
            }
        }

        self.release_locks();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        let tripped = self.state().trip(FailPoint::Rollback);
        // The connection is gone either way; staged writes never become visible.
        self.orders.clear();
        self.line_items.clear();
        self.outbox.clear();
        self.mark_sent.clear();
        self.release_locks();
        tripped
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.release_locks();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderStatus, PaymentType};
    use chrono::Utc;

    fn insert() -> OrderInsert {
        OrderInsert {
            user_id: 42,
            payment_type: PaymentType::Card,
            status: OrderStatus::Created,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_order(insert()).await.unwrap();
        tx.insert_outbox_event(Uuid::new_v4(), id).await.unwrap();

        assert_eq!(store.order_count(), 0);
        assert_eq!(store.outbox_rows().len(), 0);

        tx.commit().await.unwrap();
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes_and_locks() {
        let store = InMemoryOrderStore::new();
        store.seed_pending(1);

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(insert()).await.unwrap();
            assert_eq!(tx.lock_pending_outbox(10).await.unwrap().len(), 1);
            assert_eq!(store.locked_count(), 1);
        }

        assert_eq!(store.locked_count(), 0);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lockers_skip_each_others_rows() {
        let store = InMemoryOrderStore::new();
        for id in 1..=3 {
            store.seed_pending(id);
        }

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        let a = first.lock_pending_outbox(2).await.unwrap();
        let b = second.lock_pending_outbox(2).await.unwrap();

        assert_eq!(a.iter().map(|e| e.order_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.iter().map(|e| e.order_id).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn test_duplicate_item_is_constraint_violation() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let id = tx.insert_order(insert()).await.unwrap();
        let item = LineItem { item_id: 5, original_amount: 10, discounted_amount: 0 };

        let err = tx
            .insert_line_items(id, &[item.clone(), item])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_fail_point_fires_once() {
        let store = InMemoryOrderStore::new();
        store.fail_once(FailPoint::Begin);

        assert!(matches!(store.begin().await, Err(StoreError::Unavailable(_))));
        assert!(store.begin().await.is_ok());
    }
}
