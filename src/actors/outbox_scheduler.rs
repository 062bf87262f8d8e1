use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::messaging::MessageBus;
use crate::services::OutboxPublisher;
use crate::store::OrderStore;

// ============================================================================
// Outbox Scheduler Actor - the timer that drives publisher cycles
// ============================================================================
//
// One publisher cycle per tick. A tick that arrives while the previous
// cycle is still running is skipped. Each cycle is bounded by
// `cycle_timeout`; a timed-out cycle is dropped, which rolls its
// transaction back. Failures are logged and the next tick tries again.
//
// ============================================================================

pub struct OutboxScheduler<S: OrderStore, B: MessageBus> {
    publisher: Arc<OutboxPublisher<S, B>>,
    interval: Duration,
    cycle_timeout: Duration,
    in_flight: bool,
    stats: SchedulerStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_ok: u64,
    pub cycles_failed: u64,
    pub cycles_timed_out: u64,
    pub ticks_skipped: u64,
    pub events_published: u64,
}

impl<S: OrderStore, B: MessageBus> OutboxScheduler<S, B> {
    pub fn new(publisher: Arc<OutboxPublisher<S, B>>, interval: Duration, cycle_timeout: Duration) -> Self {
        Self {
            publisher,
            interval,
            cycle_timeout,
            in_flight: false,
            stats: SchedulerStats::default(),
        }
    }

    fn tick(&mut self, ctx: &mut Context<Self>) {
        if self.in_flight {
            self.stats.ticks_skipped += 1;
            tracing::debug!("Previous outbox cycle still running, skipping tick");
            return;
        }
        self.in_flight = true;

        let publisher = self.publisher.clone();
        let cycle_timeout = self.cycle_timeout;
        let cycle = async move { tokio::time::timeout(cycle_timeout, publisher.run_cycle()).await };

        ctx.spawn(cycle.into_actor(self).map(|outcome, act, _ctx| {
            act.in_flight = false;
            match outcome {
                Ok(Ok(report)) => {
                    act.stats.cycles_ok += 1;
                    act.stats.events_published += report.published() as u64;
                }
                Ok(Err(_)) => {
                    // Already logged by the publisher with its failing step.
                    act.stats.cycles_failed += 1;
                }
                Err(_) => {
                    act.stats.cycles_timed_out += 1;
                    tracing::warn!(
                        timeout_secs = act.cycle_timeout.as_secs_f64(),
                        "Outbox cycle timed out and was rolled back"
                    );
                }
            }
        }));
    }
}

impl<S: OrderStore, B: MessageBus> Actor for OutboxScheduler<S, B> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            "🔄 Outbox scheduler started"
        );
        self.tick(ctx);
        ctx.run_interval(self.interval, |act, ctx| act.tick(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!(stats = ?self.stats, "🛑 Outbox scheduler stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "SchedulerStats")]
pub struct GetSchedulerStats;

impl<S: OrderStore, B: MessageBus> Handler<GetSchedulerStats> for OutboxScheduler<S, B> {
    type Result = MessageResult<GetSchedulerStats>;

    fn handle(&mut self, _: GetSchedulerStats, _: &mut Self::Context) -> Self::Result {
        MessageResult(self.stats.clone())
    }
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct StopScheduler;

impl<S: OrderStore, B: MessageBus> Handler<StopScheduler> for OutboxScheduler<S, B> {
    type Result = ();

    fn handle(&mut self, _: StopScheduler, ctx: &mut Self::Context) {
        tracing::info!("Outbox scheduler received stop signal");
        ctx.stop();
    }
}
