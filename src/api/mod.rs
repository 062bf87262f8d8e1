// ============================================================================
// HTTP API - thin glue in front of the writer and the query service
// ============================================================================
//
// POST /order      create an order (and its pending outbox event)
// GET  /orders     ?ids=1,2,3 -> orders with totals, unknown ids omitted
// GET  /health     store reachability
// GET  /metrics    Prometheus text format
//
// ============================================================================

mod handlers;

use actix_web::{web, App, HttpServer};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::services::{OrderQueryService, OrderWriter};
use crate::store::OrderStore;

pub struct ApiState<S: OrderStore> {
    pub writer: OrderWriter<S>,
    pub query: OrderQueryService<S>,
    pub store: S,
    pub metrics: Arc<Metrics>,
}

impl<S: OrderStore + Clone> ApiState<S> {
    pub fn new(store: S, metrics: Arc<Metrics>) -> Self {
        Self {
            writer: OrderWriter::new(store.clone(), metrics.clone()),
            query: OrderQueryService::new(store.clone()),
            store,
            metrics,
        }
    }
}

/// Register the routes; shared by the server and the handler tests.
pub fn configure<S: OrderStore>(cfg: &mut web::ServiceConfig) {
    cfg.route("/order", web::post().to(handlers::create_order::<S>))
        .route("/orders", web::get().to(handlers::get_orders::<S>))
        .route("/health", web::get().to(handlers::health::<S>))
        .route("/metrics", web::get().to(handlers::metrics::<S>));
}

pub async fn start_http_server<S: OrderStore>(
    state: Arc<ApiState<S>>,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("🌐 Starting HTTP server on http://{}:{}", host, port);

    let data = web::Data::from(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(handlers::json_config())
            .configure(configure::<S>)
    })
    .bind((host, port))?
    .run()
    .await
}
