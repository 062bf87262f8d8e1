use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::OrderId;

// ============================================================================
// Outbox Events
// ============================================================================

/// A row of the outbox table. `sent` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub sent: bool,
}

/// Wire payload announcing a new order.
///
/// Field order is part of the format: the same (event_id, order_id) pair
/// always encodes to the same bytes, so a redelivered event is identical to
/// the first delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub event_id: Uuid,
    pub order_id: OrderId,
}

impl OrderCreated {
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl From<&OutboxEvent> for OrderCreated {
    fn from(event: &OutboxEvent) -> Self {
        Self {
            event_id: event.event_id,
            order_id: event.order_id,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
