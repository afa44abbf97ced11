use crate::payload::{sanitize_slug, DeviceContext, Payload};
use serde::{Deserialize, Serialize};

/// The ingestion unit. Immutable once the gateway has enriched it
/// (`id`, `timestamp_ms`, `idempotency_key` filled; `(category, type)`
/// derivable from `payload`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub app_id: String,
    pub device_id: String,
    pub timestamp_ms: i64,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub device_context: Option<DeviceContext>,
    pub payload: Payload,
}

impl Envelope {
    /// `(category, type)` for this envelope's payload.
    pub fn category_and_type(&self) -> (&'static str, String) {
        self.payload.category_and_type()
    }

    /// The broker subject this envelope publishes under:
    /// `events.<sanitized_app_id>.<category>.<type>`.
    pub fn subject(&self) -> String {
        let (category, event_type) = self.category_and_type();
        format!(
            "events.{}.{}.{}",
            sanitize_slug(&self.app_id),
            category,
            event_type
        )
    }

    /// The warehouse partition tuple derived from `timestamp_ms` in UTC.
    pub fn partition(&self) -> Partition {
        Partition::from_timestamp_ms(&self.app_id, self.timestamp_ms)
    }
}

/// `(app_id, year, month, day, hour)` — the warehouse's object-key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    pub app_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl Partition {
    pub fn from_timestamp_ms(app_id: &str, timestamp_ms: i64) -> Self {
        use chrono::{DateTime, Datelike, Timelike, Utc};
        let dt: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is valid"));
        Self {
            app_id: app_id.to_string(),
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
        }
    }

    /// The object-store key prefix for this partition, e.g.
    /// `events/app_id=demo/year=2026/month=07/day=26/hour=14`.
    pub fn object_prefix(&self, root_prefix: &str) -> String {
        format!(
            "{}/app_id={}/year={:04}/month={:02}/day={:02}/hour={:02}",
            root_prefix, self.app_id, self.year, self.month, self.day, self.hour
        )
    }

    /// True when this partition's hour is strictly before the current UTC
    /// hour — the compactor's "cold" predicate. The current-hour partition
    /// is never compacted because active writers may still be sealing it.
    pub fn is_cold(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        use chrono::{Datelike, Timelike};
        (self.year, self.month, self.day, self.hour)
            < (now.year(), now.month(), now.day(), now.hour())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            id: "evt-1".into(),
            app_id: "demo.app".into(),
            device_id: "d1".into(),
            timestamp_ms: 1_700_000_000_000,
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
    fn subject_sanitizes_dots_in_app_id() {
        let env = sample();
        assert_eq!(env.subject(), "events.demo_app.screen.view");
    }

    #[test]
    fn subject_is_deterministic_for_equal_envelopes() {
        let a = sample();
        let b = sample();
        assert_eq!(a.subject(), b.subject());
    }

    #[test]
    fn partition_derives_from_timestamp() {
        let env = sample();
        let partition = env.partition();
        assert_eq!(partition.app_id, "demo.app");
        assert_eq!(partition.year, 2023);
    }
}
