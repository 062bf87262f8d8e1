use async_trait::async_trait;
use std::sync::Mutex;

use super::{BusError, MessageBus, OutboxMessage};

// ============================================================================
// In-Memory Message Bus (tests only)
// ============================================================================

#[derive(Default)]
struct BusState {
    batches: Vec<Vec<OutboxMessage>>,
    failures_left: usize,
    stalled: bool,
}

#[derive(Default)]
pub struct InMemoryBus {
    state: Mutex<BusState>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` batches.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().unwrap().failures_left = n;
    }

    /// Never complete a publish until `resume` is called.
    pub fn stall(&self) {
        self.state.lock().unwrap().stalled = true;
    }

    pub fn resume(&self) {
        self.state.lock().unwrap().stalled = false;
    }

    pub fn batches(&self) -> Vec<Vec<OutboxMessage>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn messages(&self) -> Vec<OutboxMessage> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish_batch(&self, messages: &[OutboxMessage]) -> Result<(), BusError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if !state.stalled {
                    if state.failures_left > 0 {
                        state.failures_left -= 1;
                        return Err(BusError::Delivery {
                            failed: messages.len(),
                            total: messages.len(),
                            reason: "injected broker failure".to_string(),
                        });
                    }
                    state.batches.push(messages.to_vec());
                    return Ok(());
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
