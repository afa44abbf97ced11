//! Bearer-key authentication: `X-API-Key: <64 lowercase hex>`. Format is
//! checked before ever touching the store, so a malformed header never
//! causes a lookup.

use crate::state::AppState;
use actix_web::HttpRequest;
use causality_apikey::{hash_key, is_well_formed_key};
use causality_errors::CausalityError;

pub async fn authenticate(req: &HttpRequest, state: &AppState) -> Result<String, CausalityError> {
    let header = req
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(CausalityError::Unauthenticated)?;

    if !is_well_formed_key(header) {
        return Err(CausalityError::Unauthenticated);
    }

    let hash = hash_key(header);
    let key = state
        .api_keys
        .validate_by_hash(&hash)
        .await
        .map_err(|e| CausalityError::Internal(e.to_string()))?
        .ok_or(CausalityError::Unauthenticated)?;

    Ok(key.app_id)
}
