use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::errors::ValidationError;
use super::value_objects::{LineItem, OrderId, OrderStatus, OrderTotals, PaymentType};

// ============================================================================
// Order Draft - unvalidated input as it arrives from a client
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub user_id: i64,
    pub payment_type: String,
    #[serde(default)]
    pub items: Vec<DraftItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftItem {
    pub id: i64,
    pub amount: i64,
    #[serde(default)]
    pub discount: i64,
}

impl OrderDraft {
    /// Check the draft and turn it into an order the writer may persist.
    /// Reports the first problem found.
    pub fn validate(self) -> Result<NewOrder, ValidationError> {
        if self.user_id <= 0 {
            return Err(ValidationError::InvalidUserId(self.user_id));
        }

        let payment_type: PaymentType = self.payment_type.parse()?;

        if self.items.is_empty() {
            return Err(ValidationError::EmptyItems);
        }

        let mut items: Vec<LineItem> = Vec::with_capacity(self.items.len());
        let mut seen = HashSet::with_capacity(self.items.len());
        let mut totals = OrderTotals::default();
        for item in self.items {
            if item.id <= 0 {
                return Err(ValidationError::InvalidItemId(item.id));
            }
            if item.amount <= 0 {
                return Err(ValidationError::InvalidAmount {
                    item_id: item.id,
                    amount: item.amount,
                });
            }
            if item.discount < 0 {
                return Err(ValidationError::InvalidDiscount {
                    item_id: item.id,
                    discount: item.discount,
                });
            }
            if !seen.insert(item.id) {
                return Err(ValidationError::DuplicateItem(item.id));
            }

            let line = LineItem {
                item_id: item.id,
                original_amount: item.amount,
                discounted_amount: item.discount,
            };
            // Reject now what could not be summed on read.
            totals = totals.checked_add(&line).ok_or(ValidationError::TotalsOverflow)?;
            items.push(line);
        }

        Ok(NewOrder {
            user_id: self.user_id,
            payment_type,
            status: OrderStatus::Created,
            items,
        })
    }
}

// ============================================================================
// New Order - validated, not yet persisted
// ============================================================================

/// Only obtainable through [`OrderDraft::validate`], so holding one means the
/// shape checks already passed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    user_id: i64,
    payment_type: PaymentType,
    status: OrderStatus,
    items: Vec<LineItem>,
}

impl NewOrder {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn payment_type(&self) -> PaymentType {
        self.payment_type
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }
}

// ============================================================================
// Order - committed order as read back from the store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: i64,
    pub payment_type: PaymentType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub totals: OrderTotals,
}

impl Order {
    pub fn new(
        id: OrderId,
        user_id: i64,
        payment_type: PaymentType,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            payment_type,
            status,
            created_at,
            items: Vec::new(),
            totals: OrderTotals::default(),
        }
    }

    /// Attach a line item and fold it into the totals. The order is left
    /// unchanged if the totals would overflow.
    pub fn push_item(&mut self, item: LineItem) -> Result<(), ValidationError> {
        self.totals = self
            .totals
            .checked_add(&item)
            .ok_or(ValidationError::TotalsOverflow)?;
        self.items.push(item);
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
