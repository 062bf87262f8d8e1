use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ValidationError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Store-assigned order identity.
pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Card,
    Wallet,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Card => "card",
            PaymentType::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentType::Card),
            "wallet" => Ok(PaymentType::Wallet),
            other => Err(ValidationError::InvalidPaymentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(OrderStatus::Created),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// A committed line item. There is no update path for these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: i64,
    pub original_amount: i64,
    pub discounted_amount: i64,
}

/// Sums of the line item amounts. Computed on read, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub original_amount: i64,
    pub discounted_amount: i64,
}

impl OrderTotals {
    /// Totals with `item` added, or `None` if either sum leaves the i64 range.
    pub fn checked_add(self, item: &LineItem) -> Option<Self> {
        Some(Self {
            original_amount: self.original_amount.checked_add(item.original_amount)?,
            discounted_amount: self.discounted_amount.checked_add(item.discounted_amount)?,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
