//! The wire shape of an incoming envelope, distinct from
//! [`causality_contracts::Envelope`]: clients may omit `id`,
//! `timestamp_ms`, and `idempotency_key`, which the gateway fills in
//! during enrichment. Keeping this as its own type rather than an
//! all-`Option` `Envelope` keeps the enriched type's invariants ("never
//! empty post-gateway") structurally enforced everywhere downstream.

use causality_contracts::{DeviceContext, Envelope, Payload};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingEnvelope {
    pub id: Option<String>,
    pub app_id: Option<String>,
    pub device_id: String,
    pub timestamp_ms: Option<i64>,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub device_context: Option<DeviceContext>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingDeviceId,
    MissingAppId,
    AppIdMismatch,
    EmptyCustomEventName,
}

impl ValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            ValidationError::MissingDeviceId => "device_id must not be empty",
            ValidationError::MissingAppId => "app_id must not be empty",
            ValidationError::AppIdMismatch => "app_id does not match the authenticated tenant",
            ValidationError::EmptyCustomEventName => "custom events require a non-empty event_name",
        }
    }
}

/// Validate, then enrich: fill `id`/`timestamp_ms` when absent, derive
/// `idempotency_key` when absent (defaulting to the generated `id`), and
/// cross-check any client-supplied `app_id` against the authenticated
/// tenant.
pub fn validate_and_enrich(
    incoming: IncomingEnvelope,
    authenticated_app_id: &str,
) -> Result<Envelope, ValidationError> {
    if incoming.device_id.trim().is_empty() {
        return Err(ValidationError::MissingDeviceId);
    }

    let app_id = match incoming.app_id {
        Some(ref provided) if provided.trim().is_empty() => {
            return Err(ValidationError::MissingAppId)
        }
        Some(provided) if provided != authenticated_app_id => {
            return Err(ValidationError::AppIdMismatch)
        }
        Some(provided) => provided,
        None => authenticated_app_id.to_string(),
    };

    if let Payload::CustomEvent { event_name, .. } = &incoming.payload {
        if event_name.trim().is_empty() {
            return Err(ValidationError::EmptyCustomEventName);
        }
    }

    let id = incoming
        .id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let timestamp_ms = incoming
        .timestamp_ms
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let idempotency_key = incoming
        .idempotency_key
        .filter(|s| !s.is_empty())
        .or_else(|| Some(id.clone()));

    Ok(Envelope {
        id,
        app_id,
        device_id: incoming.device_id,
        timestamp_ms,
        correlation_id: incoming.correlation_id,
        idempotency_key,
        device_context: incoming.device_context,
        payload: incoming.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming() -> IncomingEnvelope {
        IncomingEnvelope {
            id: None,
            app_id: None,
            device_id: "d1".into(),
            timestamp_ms: None,
            correlation_id: None,
            idempotency_key: None,
            device_context: None,
            payload: Payload::ScreenView {
                screen_name: "home".into(),
                previous_screen: None,
            },
        }
    }

    #[test]
    fn fills_id_and_timestamp_when_absent() {
        let env = validate_and_enrich(incoming(), "demo").unwrap();
        assert!(!env.id.is_empty());
        assert!(env.timestamp_ms > 0);
        assert_eq!(env.app_id, "demo");
    }

    #[test]
    fn idempotency_key_defaults_to_generated_id() {
        let env = validate_and_enrich(incoming(), "demo").unwrap();
        assert_eq!(env.idempotency_key.as_deref(), Some(env.id.as_str()));
    }

    #[test]
    fn client_supplied_idempotency_key_is_authoritative() {
        let mut raw = incoming();
        raw.idempotency_key = Some("client-key".into());
        let env = validate_and_enrich(raw, "demo").unwrap();
        assert_eq!(env.idempotency_key.as_deref(), Some("client-key"));
    }

    #[test]
    fn rejects_empty_device_id() {
        let mut raw = incoming();
        raw.device_id = "  ".into();
        assert_eq!(
            validate_and_enrich(raw, "demo").unwrap_err(),
            ValidationError::MissingDeviceId
        );
    }

    #[test]
    fn rejects_mismatched_app_id() {
        let mut raw = incoming();
        raw.app_id = Some("other-tenant".into());
        assert_eq!(
            validate_and_enrich(raw, "demo").unwrap_err(),
            ValidationError::AppIdMismatch
        );
    }

    #[test]
    fn accepts_matching_app_id_override() {
        let mut raw = incoming();
        raw.app_id = Some("demo".into());
        assert!(validate_and_enrich(raw, "demo").is_ok());
    }

    #[test]
    fn rejects_empty_custom_event_name() {
        let mut raw = incoming();
        raw.payload = Payload::CustomEvent {
            event_name: "   ".into(),
            parameters: Default::default(),
        };
        assert_eq!(
            validate_and_enrich(raw, "demo").unwrap_err(),
            ValidationError::EmptyCustomEventName
        );
    }
}
