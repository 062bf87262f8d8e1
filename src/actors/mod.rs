// ============================================================================
// Actors Module
// ============================================================================
//
// Actors are reserved for infrastructure concerns. Order creation and the
// publisher cycle itself are plain services; the scheduler actor only
// decides when a cycle runs.
//
// ============================================================================

mod outbox_scheduler;

pub use outbox_scheduler::{GetSchedulerStats, OutboxScheduler, SchedulerStats, StopScheduler};
