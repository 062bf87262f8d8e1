use actix::prelude::*;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod config;
mod domain;
mod messaging;
mod metrics;
mod services;
mod store;
mod utils;

use actors::{OutboxScheduler, StopScheduler};
use api::ApiState;
use crate::config::AppConfig;
use messaging::RedpandaClient;
use services::OutboxPublisher;
use store::PgOrderStore;

#[derive(Debug, Parser)]
#[command(name = "order-outbox", version, about = "Order service with a transactional outbox")]
struct Cli {
    /// YAML config file, layered over ./config.yaml
    #[arg(long, env = "ORDER_OUTBOX_CONF")]
    conf: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API and the outbox scheduler (default)
    Serve,
    /// Run a single outbox publisher cycle and exit
    PublishOutbox,
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_outbox=debug"))
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.conf.as_deref())?;

    tracing::info!("🚀 Starting order outbox service");

    // === 1. Order store ===
    tracing::info!("Connecting to Postgres...");
    let store = PgOrderStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Message bus (with circuit breaker) ===
    let bus = Arc::new(RedpandaClient::new(&config.bus, metrics.clone())?);

    let publisher = OutboxPublisher::new(store.clone(), bus, config.bus.topic.clone(), metrics.clone())
        .with_batch_size(config.publisher.batch_size);

    match cli.command.unwrap_or(Command::Serve) {
        Command::PublishOutbox => {
            let report = publisher.run_cycle().await?;
            tracing::info!(published = report.published(), "✅ Outbox cycle complete");
            Ok(())
        }
        Command::Serve => {
            // === 4. Outbox scheduler ===
            let scheduler = if config.publisher.enabled {
                let addr = OutboxScheduler::new(
                    Arc::new(publisher),
                    Duration::from_secs(config.publisher.interval_secs),
                    Duration::from_secs(config.publisher.cycle_timeout_secs),
                )
                .start();
                Some(addr)
            } else {
                tracing::info!("Outbox publisher disabled, relying on external publish-outbox runs");
                None
            };

            // === 5. HTTP API ===
            let state = Arc::new(ApiState::new(store, metrics));
            let served = api::start_http_server(state, &config.http.host, config.http.port).await;

            if let Some(addr) = scheduler {
                addr.do_send(StopScheduler);
            }
            tracing::info!("👋 Shutting down");
            Ok(served?)
        }
    }
}
