use std::collections::HashMap;

use crate::domain::order::{Order, OrderId};
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Order Query Service - read orders back with their totals
// ============================================================================

pub struct OrderQueryService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderQueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Orders for the given ids keyed by id. Ids that do not exist are left
    /// out of the map; that is not an error.
    pub async fn get_orders(&self, ids: &[OrderId]) -> Result<HashMap<OrderId, Order>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut orders: HashMap<OrderId, Order> = self
            .store
            .fetch_orders(ids)
            .await?
            .into_iter()
            .map(|r| (r.id, Order::new(r.id, r.user_id, r.payment_type, r.status, r.created_at)))
            .collect();

        if orders.is_empty() {
            return Ok(orders);
        }

        let found: Vec<OrderId> = orders.keys().copied().collect();
        for record in self.store.fetch_line_items(&found).await? {
            if let Some(order) = orders.get_mut(&record.order_id) {
                order
                    .push_item(record.item)
                    .map_err(|e| StoreError::CorruptRow(format!("order {}: {}", record.order_id, e)))?;
            }
        }

        tracing::debug!(requested = ids.len(), found = orders.len(), "Loaded orders");
        Ok(orders)
    }
}
