//! The fixed columnar schema shared between the warehouse sink and the
//! compaction engine — stable across both so compacted files stay
//! byte-compatible with freshly sealed ones.

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("app_id", DataType::Utf8, false),
        Field::new("device_id", DataType::Utf8, false),
        Field::new("timestamp_ms", DataType::Int64, false),
        Field::new("correlation_id", DataType::Utf8, true),
        Field::new("idempotency_key", DataType::Utf8, true),
        Field::new("category", DataType::Utf8, false),
        Field::new("event_type", DataType::Utf8, false),
        Field::new("device_os", DataType::Utf8, true),
        Field::new("device_os_version", DataType::Utf8, true),
        Field::new("device_app_version", DataType::Utf8, true),
        Field::new("device_locale", DataType::Utf8, true),
        Field::new("payload_json", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("hour", DataType::Int32, false),
    ]))
}
