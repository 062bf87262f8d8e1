use actix_web::{error, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::ApiState;
use crate::domain::order::{Order, OrderDraft, OrderId};
use crate::store::OrderStore;

/// Malformed bodies get the same `{"error": ..}` shape as validation errors.
pub(super) fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = json!({ "error": err.to_string() });
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

pub(super) async fn create_order<S: OrderStore>(
    state: web::Data<ApiState<S>>,
    body: web::Json<OrderDraft>,
) -> HttpResponse {
    match state.writer.create_order(body.into_inner()).await {
        Ok(order_id) => HttpResponse::Created().json(json!({ "success": "ok", "order_id": order_id })),
        Err(e) if e.is_validation() => HttpResponse::BadRequest().json(json!({ "error": e.to_string() })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct OrdersQuery {
    ids: Option<String>,
}

fn parse_ids(raw: &str) -> Result<Vec<OrderId>, String> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<OrderId>().map_err(|_| format!("invalid order id: {s}")))
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err("ids must not be empty".to_string());
    }
    Ok(ids)
}

pub(super) async fn get_orders<S: OrderStore>(
    state: web::Data<ApiState<S>>,
    query: web::Query<OrdersQuery>,
) -> HttpResponse {
    let Some(raw) = query.ids.as_deref() else {
        return HttpResponse::BadRequest().json(json!({ "error": "missing query parameter: ids" }));
    };
    let ids = match parse_ids(raw) {
        Ok(ids) => ids,
        Err(msg) => return HttpResponse::BadRequest().json(json!({ "error": msg })),
    };

    match state.query.get_orders(&ids).await {
        Ok(orders) => {
            let mut orders: Vec<Order> = orders.into_values().collect();
            orders.sort_by_key(|o| o.id);
            HttpResponse::Ok().json(orders)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load orders");
            HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    }
}

pub(super) async fn health<S: OrderStore>(state: web::Data<ApiState<S>>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "healthy" })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unhealthy", "error": e.to_string() }))
        }
    }
}

pub(super) async fn metrics<S: OrderStore>(state: web::Data<ApiState<S>>) -> HttpResponse {
    match state.metrics.render() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e))
        }
    }
}
