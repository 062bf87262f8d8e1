use async_trait::async_trait;
use futures_util::future::join_all;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::{BusError, MessageBus, OutboxMessage};
use crate::config::BusConfig;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    delivery_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl RedpandaClient {
    pub fn new(config: &BusConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| anyhow::anyhow!("Failed to create Redpanda producer: {}", e))?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker.failure_threshold,
            timeout: Duration::from_secs(config.circuit_breaker.open_timeout_secs),
            success_threshold: config.circuit_breaker.success_threshold,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(cb_config),
            delivery_timeout: Duration::from_millis(config.message_timeout_ms),
            metrics,
        })
    }

    /// Enqueue every record in order, then wait for all deliveries.
    async fn send_all(&self, messages: &[OutboxMessage]) -> Result<(), BusError> {
        let deliveries = messages.iter().map(|msg| {
            let record = FutureRecord::to(&msg.topic)
                .key(msg.key.as_str())
                .payload(msg.payload.as_slice());
            self.producer.send(record, Timeout::After(self.delivery_timeout))
        });

        let results = join_all(deliveries).await;
        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|(e, _)| e.to_string()))
            .collect();

        match failures.first() {
            None => Ok(()),
            Some(first) => Err(BusError::Delivery {
                failed: failures.len(),
                total: messages.len(),
                reason: first.clone(),
            }),
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }
}

#[async_trait]
impl MessageBus for RedpandaClient {
    async fn publish_batch(&self, messages: &[OutboxMessage]) -> Result<(), BusError> {
        if messages.is_empty() {
            return Ok(());
        }

        let result = self.circuit_breaker.call(self.send_all(messages)).await;
        self.metrics
            .update_circuit_breaker_state(self.circuit_state().await);

        match result {
            Ok(()) => {
                tracing::debug!(message_count = messages.len(), "Published batch to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    message_count = messages.len(),
                    "Circuit breaker open - Redpanda unavailable"
                );
                Err(BusError::Unavailable("circuit breaker open".to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, "Failed to publish batch to Redpanda");
                Err(e)
            }
        }
    }
}
