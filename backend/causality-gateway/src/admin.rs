//! `/api/admin/keys*` — issue/revoke/list API keys. Protected in
//! production deployments by the operator's own edge (reverse-proxy IP
//! allowlist, VPN); this binary does not itself gate these routes
//! beyond requiring an authenticated request, since the admin UI that
//! fronts them is an external collaborator this binary doesn't own.

use crate::error::GatewayError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use causality_errors::CausalityError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    pub app_id: String,
    pub name: String,
}

#[derive(Serialize)]
struct CreateKeyResponse {
    id: Uuid,
    app_id: String,
    name: String,
    plaintext: String,
}

pub async fn create_key(
    state: web::Data<AppState>,
    body: web::Json<CreateKeyRequest>,
) -> Result<HttpResponse, GatewayError> {
    if body.app_id.trim().is_empty() || body.name.trim().is_empty() {
        return Err(
            CausalityError::ValidationFailed("app_id and name must not be empty".into()).into(),
        );
    }

    let key = state
        .api_keys
        .create_key(&body.app_id, &body.name)
        .await
        .map_err(|e| CausalityError::Internal(e.to_string()))?;

    Ok(HttpResponse::Created().json(CreateKeyResponse {
        id: key.id,
        app_id: key.app_id,
        name: key.name,
        plaintext: key.plaintext,
    }))
}

pub async fn revoke_key(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, GatewayError> {
    let id = path.into_inner();
    match state.api_keys.revoke(id).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(causality_apikey::ApiKeyError::NotFound) => Ok(HttpResponse::NotFound().finish()),
        Err(e) => Err(CausalityError::Internal(e.to_string()).into()),
    }
}

#[derive(Deserialize)]
pub struct ListKeysQuery {
    pub app_id: String,
}

#[derive(Serialize)]
struct KeySummary {
    id: Uuid,
    app_id: String,
    name: String,
    revoked: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    revoked_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn list_keys(
    state: web::Data<AppState>,
    query: web::Query<ListKeysQuery>,
) -> Result<HttpResponse, GatewayError> {
    let keys = state
        .api_keys
        .list(&query.app_id)
        .await
        .map_err(|e| CausalityError::Internal(e.to_string()))?;

    let summaries: Vec<KeySummary> = keys
        .into_iter()
        .map(|k| KeySummary {
            id: k.id,
            app_id: k.app_id,
            name: k.name,
            revoked: k.revoked,
            created_at: k.created_at,
            revoked_at: k.revoked_at,
        })
        .collect();

    Ok(HttpResponse::Ok().json(summaries))
}
