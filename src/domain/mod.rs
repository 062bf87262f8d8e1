// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Orders, their line items and the event announcing their creation.
// Nothing here touches the store or the bus.
//
// ============================================================================

pub mod order;
