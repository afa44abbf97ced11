//! `/health`, `/ready`, `/metrics` on the reaction engine's admin port —
//! the other HTTP-exposing binary besides the gateway.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use prometheus::{Encoder, TextEncoder};

pub async fn health() -> HttpResponse {
    HttpResponse::Ok()
        .json(serde_json::json!({"status": "healthy", "service": "causality-reaction"}))
}

pub async fn ready(state: web::Data<AppState>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({"status": "ready"})),
        Err(e) => HttpResponse::ServiceUnavailable()
            .json(serde_json::json!({"status": "not_ready", "reason": e.to_string()})),
    }
}

pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    let _ = state.outbox.record_pending_metrics(&state.outbox_metrics).await;

    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type(encoder.format_type())
            .body(buffer),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}
