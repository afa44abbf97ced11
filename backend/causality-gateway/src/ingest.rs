//! `POST /v1/events/ingest` and `POST /v1/events/batch`. Both run the
//! same pipeline per envelope — body cap, auth, rate limit, decode,
//! validate, enrich, dedup probe, publish — the batch endpoint just
//! runs that pipeline per element and never aborts the whole request on
//! a single envelope's failure.

use crate::error::GatewayError;
use crate::state::AppState;
use crate::wire::{validate_and_enrich, IncomingEnvelope};
use actix_web::{web, HttpRequest, HttpResponse};
use causality_errors::{CausalityError, RejectedEnvelope};
use serde::Serialize;
use tracing::info;

pub async fn ingest_single(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    if body.len() > state.config.body_max_bytes {
        return Ok(HttpResponse::PayloadTooLarge().finish());
    }

    let app_id = crate::auth::authenticate(&req, &state).await?;

    if let Err(denied) = state.rate_limiter.check(&app_id) {
        return Ok(HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", denied.retry_after.as_secs().to_string()))
            .finish());
    }

    let incoming: IncomingEnvelope = serde_json::from_slice(&body)
        .map_err(|e| GatewayError(CausalityError::DecodeFailed(e.to_string())))?;

    let envelope = validate_and_enrich(incoming, &app_id)
        .map_err(|e| GatewayError(CausalityError::ValidationFailed(e.message().to_string())))?;

    if let Some(key) = envelope.idempotency_key.as_deref() {
        if state.dedup.is_duplicate(key) {
            state.dedup_drops_total.inc();
            info!(app_id = %app_id, envelope_id = %envelope.id, "dedup dropped");
            return Ok(HttpResponse::Accepted().finish());
        }
    }

    publish_envelope(&state, &envelope).await?;
    state.accepted_total.inc();
    Ok(HttpResponse::Accepted().finish())
}

#[derive(Serialize)]
struct BatchResponse {
    accepted: usize,
    rejected: Vec<RejectedEnvelope>,
}

pub async fn ingest_batch(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    if body.len() > state.config.body_max_bytes {
        return Ok(HttpResponse::PayloadTooLarge().finish());
    }

    let app_id = crate::auth::authenticate(&req, &state).await?;

    if let Err(denied) = state.rate_limiter.check(&app_id) {
        return Ok(HttpResponse::TooManyRequests()
            .insert_header(("Retry-After", denied.retry_after.as_secs().to_string()))
            .finish());
    }

    let incoming: Vec<IncomingEnvelope> = serde_json::from_slice(&body)
        .map_err(|e| GatewayError(CausalityError::DecodeFailed(e.to_string())))?;

    let mut accepted = 0usize;
    let mut rejected = Vec::new();

    for (index, item) in incoming.into_iter().enumerate() {
        let envelope = match validate_and_enrich(item, &app_id) {
            Ok(env) => env,
            Err(e) => {
                rejected.push(RejectedEnvelope {
                    index,
                    reason_code: "validation_failed",
                    reason: e.message().to_string(),
                });
                continue;
            }
        };

        if let Some(key) = envelope.idempotency_key.as_deref() {
            if state.dedup.is_duplicate(key) {
                state.dedup_drops_total.inc();
                accepted += 1;
                continue;
            }
        }

        match publish_envelope(&state, &envelope).await {
            Ok(()) => accepted += 1,
            Err(e) => rejected.push(RejectedEnvelope {
                index,
                reason_code: e.0.code(),
                reason: e.0.to_string(),
            }),
        }
    }

    state.accepted_total.inc_by(accepted as u64);
    Ok(HttpResponse::Ok().json(BatchResponse { accepted, rejected }))
}

async fn publish_envelope(
    state: &AppState,
    envelope: &causality_contracts::Envelope,
) -> Result<(), GatewayError> {
    let subject = envelope.subject();
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| GatewayError(CausalityError::SerializationFailed(e)))?;

    state
        .broker
        .publish(&subject, bytes.into())
        .await
        .map_err(|e| GatewayError(CausalityError::BrokerUnavailable(e.to_string())))?;

    Ok(())
}
