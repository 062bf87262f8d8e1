// ============================================================================
// Message Bus
// ============================================================================
//
// The publisher only needs one capability from the broker: publish a batch,
// all-or-nothing from the caller's point of view, and block until the
// broker has acknowledged it. A batch that is partially delivered is
// reported as a failure and retried as a whole.
//
// ============================================================================

mod redpanda;
#[cfg(test)]
pub(crate) mod memory;

pub use redpanda::RedpandaClient;

use async_trait::async_trait;

/// A single record ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("{failed} of {total} messages were not delivered: {reason}")]
    Delivery {
        failed: usize,
        total: usize,
        reason: String,
    },

    #[error("message bus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    async fn publish_batch(&self, messages: &[OutboxMessage]) -> Result<(), BusError>;
}
