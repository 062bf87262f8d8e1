// ============================================================================
// Order Validation Errors
// ============================================================================

/// Rejections raised before an order ever reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid user id: {0}")]
    InvalidUserId(i64),

    #[error("invalid payment type: {0:?}")]
    InvalidPaymentType(String),

    #[error("order items cannot be empty")]
    EmptyItems,

    #[error("invalid item id: {0}")]
    InvalidItemId(i64),

    #[error("invalid amount {amount} for item {item_id}")]
    InvalidAmount { item_id: i64, amount: i64 },

    #[error("invalid discount {discount} for item {item_id}")]
    InvalidDiscount { item_id: i64, discount: i64 },

    #[error("item {0} appears more than once")]
    DuplicateItem(i64),

    #[error("order totals exceed the supported range")]
    TotalsOverflow,
}
