// ============================================================================
// Services - the units of work behind the API and the scheduler
// ============================================================================
//
// Each service gets its store handle (and bus) injected at construction and
// opens its own transaction per call.
//
// ============================================================================

mod order_query;
mod order_writer;
mod outbox_publisher;

pub use order_query::OrderQueryService;
pub use order_writer::{CreateOrderError, OrderWriter};
pub use outbox_publisher::{CycleReport, OutboxPublisher, PublishCycleError};
