//! `/admin/outbox/stats` and `/admin/deliveries/{id}/retry` for
//! operator-driven retry. Protected by the operator's own edge, same
//! posture as the gateway's `/api/admin/keys*` — the admin UI that
//! fronts these routes is an external collaborator this binary doesn't
//! own.

use crate::error::ReactionError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use causality_errors::CausalityError;
use causality_outbox::OutboxError;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
struct OutboxStats {
    pending: i64,
    oldest_pending_age_seconds: i64,
}

pub async fn outbox_stats(state: web::Data<AppState>) -> Result<HttpResponse, ReactionError> {
    state
        .outbox
        .record_pending_metrics(&state.outbox_metrics)
        .await
        .map_err(|e| CausalityError::Internal(e.to_string()))?;

    Ok(HttpResponse::Ok().json(OutboxStats {
        pending: state.outbox_metrics.pending.get(),
        oldest_pending_age_seconds: state.outbox_metrics.oldest_pending_age_seconds.get(),
    }))
}

pub async fn retry_delivery(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ReactionError> {
    let id = path.into_inner();
    match state.outbox.reset_to_pending(id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(OutboxError::NotFound) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Err(CausalityError::Internal(e.to_string()).into()),
    }
}
