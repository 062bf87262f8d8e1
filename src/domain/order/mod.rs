// ============================================================================
// Order Domain
// ============================================================================
//
// Everything order-shaped, independent of storage and transport:
// - Value objects (PaymentType, OrderStatus, LineItem, OrderTotals)
// - Drafts and their validation into NewOrder
// - The Order read model
// - Outbox rows and the OrderCreated wire payload
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod model;
pub mod events;

pub use value_objects::*;
pub use errors::*;
pub use model::*;
pub use events::*;
