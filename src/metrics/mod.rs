use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::utils::CircuitState;

// ============================================================================
// Metrics - Prometheus metrics for the writer and the outbox publisher
// ============================================================================
//
// - order creation (successes, failures by step)
// - publisher cycles (outcome, batch size, duration, events published)
// - broker circuit breaker state
//
// Scraped through GET /metrics on the HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub order_create_failures: IntCounterVec,

    pub outbox_cycles: IntCounterVec,
    pub outbox_events_published: IntCounter,
    pub outbox_batch_size: Histogram,
    pub outbox_cycle_duration: Histogram,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders committed with their outbox event")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_create_failures = IntCounterVec::new(
            Opts::new("order_create_failures_total", "Order creations that failed"),
            &["step"],
        )?;
        registry.register(Box::new(order_create_failures.clone()))?;

        let outbox_cycles = IntCounterVec::new(
            Opts::new("outbox_cycles_total", "Outbox publisher cycles by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(outbox_cycles.clone()))?;

        let outbox_events_published = IntCounter::new(
            "outbox_events_published_total",
            "Outbox events published and marked sent",
        )?;
        registry.register(Box::new(outbox_events_published.clone()))?;

        let outbox_batch_size = Histogram::with_opts(
            HistogramOpts::new("outbox_batch_size", "Pending events selected per cycle")
                .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        )?;
        registry.register(Box::new(outbox_batch_size.clone()))?;

        let outbox_cycle_duration = Histogram::with_opts(
            HistogramOpts::new("outbox_cycle_duration_seconds", "Outbox publisher cycle duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(outbox_cycle_duration.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "bus_circuit_breaker_state",
            "Broker circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_create_failures,
            outbox_cycles,
            outbox_events_published,
            outbox_batch_size,
            outbox_cycle_duration,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self) {
        self.orders_created.inc();
    }

    pub fn record_order_failure(&self, step: &str) {
        self.order_create_failures.with_label_values(&[step]).inc();
    }

    pub fn record_cycle(&self, outcome: &str, batch_size: usize, published: usize, duration_secs: f64) {
        self.outbox_cycles.with_label_values(&[outcome]).inc();
        self.outbox_batch_size.observe(batch_size as f64);
        self.outbox_events_published.inc_by(published as u64);
        self.outbox_cycle_duration.observe(duration_secs);
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
