//! Shared error taxonomy for the Causality ingestion pipeline.
//!
//! One enum, one variant per error kind named in the design. Binaries that
//! expose HTTP map a subset of these to status codes at their own edge
//! (see `causality-gateway::error` for the `ResponseError` impl); this
//! crate stays framework-agnostic.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CausalityError>;

#[derive(Debug, Error)]
pub enum CausalityError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("rate limited")]
    RateLimited,

    #[error("duplicate dropped")]
    DuplicateDropped,

    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("broker timeout")]
    BrokerTimeout,

    #[error("decode failed: {0}")]
    DecodeFailed(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("object store unavailable: {0}")]
    ObjectStoreUnavailable(String),

    #[error("object store conflict: {0}")]
    ObjectStoreConflict(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("delivery transient failure: {0}")]
    DeliveryTransient(String),

    #[error("delivery permanent failure: {0}")]
    DeliveryPermanent(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("shutdown timed out waiting for {0}")]
    ShutdownTimeout(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CausalityError {
    /// A short machine-readable code, stable across releases, suitable for
    /// the batch-ingest `rejected[]` reason field and for log/metric
    /// labels.
    pub fn code(&self) -> &'static str {
        match self {
            CausalityError::ValidationFailed(_) => "validation_failed",
            CausalityError::Unauthenticated => "unauthenticated",
            CausalityError::RateLimited => "rate_limited",
            CausalityError::DuplicateDropped => "duplicate_dropped",
            CausalityError::BrokerUnavailable(_) => "broker_unavailable",
            CausalityError::BrokerTimeout => "broker_timeout",
            CausalityError::DecodeFailed(_) => "decode_failed",
            CausalityError::SerializationFailed(_) => "serialization_failed",
            CausalityError::ObjectStoreUnavailable(_) => "object_store_unavailable",
            CausalityError::ObjectStoreConflict(_) => "object_store_conflict",
            CausalityError::EncodingFailed(_) => "encoding_failed",
            CausalityError::DeliveryTransient(_) => "delivery_transient",
            CausalityError::DeliveryPermanent(_) => "delivery_permanent",
            CausalityError::ConfigInvalid(_) => "config_invalid",
            CausalityError::ShutdownTimeout(_) => "shutdown_timeout",
            CausalityError::Database(_) => "database_error",
            CausalityError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RejectedEnvelope {
    pub index: usize,
    pub reason_code: &'static str,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_for_validation_failed() {
        let err = CausalityError::ValidationFailed("missing app_id".into());
        assert_eq!(err.code(), "validation_failed");
    }
}
