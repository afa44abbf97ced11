//! Flatten envelopes into the shared schema and encode them as a Parquet
//! file, with row groups sized to roughly 10k rows.

use crate::error::Result;
use crate::schema::schema;
use arrow::array::{Int32Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use causality_contracts::Envelope;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression as ParquetCompression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Snappy,
    Gzip,
    Zstd,
    None,
}

impl From<Compression> for ParquetCompression {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Gzip => ParquetCompression::GZIP(Default::default()),
            Compression::Zstd => ParquetCompression::ZSTD(Default::default()),
            Compression::None => ParquetCompression::UNCOMPRESSED,
        }
    }
}

const ROW_GROUP_SIZE: usize = 10_000;

pub fn envelopes_to_batch(envelopes: &[Envelope]) -> Result<RecordBatch> {
    let category_and_types: Vec<(&'static str, String)> =
        envelopes.iter().map(|e| e.category_and_type()).collect();
    let partitions: Vec<_> = envelopes.iter().map(|e| e.partition()).collect();
    let payload_json: Vec<String> = envelopes
        .iter()
        .map(|e| serde_json::to_string(&e.payload.to_serializable_map()).unwrap_or_default())
        .collect();

    let id: Vec<&str> = envelopes.iter().map(|e| e.id.as_str()).collect();
    let app_id: Vec<&str> = envelopes.iter().map(|e| e.app_id.as_str()).collect();
    let device_id: Vec<&str> = envelopes.iter().map(|e| e.device_id.as_str()).collect();
    let timestamp_ms: Vec<i64> = envelopes.iter().map(|e| e.timestamp_ms).collect();
    let correlation_id: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.correlation_id.as_deref())
        .collect();
    let idempotency_key: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.idempotency_key.as_deref())
        .collect();
    let category: Vec<&str> = category_and_types.iter().map(|(c, _)| *c).collect();
    let event_type: Vec<&str> = category_and_types.iter().map(|(_, t)| t.as_str()).collect();
    let device_os: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.device_context.as_ref().and_then(|d| d.platform.as_deref()))
        .collect();
    let device_os_version: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.device_context.as_ref().and_then(|d| d.os_version.as_deref()))
        .collect();
    let device_app_version: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.device_context.as_ref().and_then(|d| d.app_version.as_deref()))
        .collect();
    let device_locale: Vec<Option<&str>> = envelopes
        .iter()
        .map(|e| e.device_context.as_ref().and_then(|d| d.locale.as_deref()))
        .collect();
    let payload_json: Vec<&str> = payload_json.iter().map(|s| s.as_str()).collect();
    let year: Vec<i32> = partitions.iter().map(|p| p.year).collect();
    let month: Vec<i32> = partitions.iter().map(|p| p.month as i32).collect();
    let day: Vec<i32> = partitions.iter().map(|p| p.day as i32).collect();
    let hour: Vec<i32> = partitions.iter().map(|p| p.hour as i32).collect();

    let batch = RecordBatch::try_new(
        schema(),
        vec![
            Arc::new(StringArray::from(id)),
            Arc::new(StringArray::from(app_id)),
            Arc::new(StringArray::from(device_id)),
            Arc::new(Int64Array::from(timestamp_ms)),
            Arc::new(StringArray::from(correlation_id)),
            Arc::new(StringArray::from(idempotency_key)),
            Arc::new(StringArray::from(category)),
            Arc::new(StringArray::from(event_type)),
            Arc::new(StringArray::from(device_os)),
            Arc::new(StringArray::from(device_os_version)),
            Arc::new(StringArray::from(device_app_version)),
            Arc::new(StringArray::from(device_locale)),
            Arc::new(StringArray::from(payload_json)),
            Arc::new(Int32Array::from(year)),
            Arc::new(Int32Array::from(month)),
            Arc::new(Int32Array::from(day)),
            Arc::new(Int32Array::from(hour)),
        ],
    )?;
    Ok(batch)
}

pub fn encode_envelopes(envelopes: &[Envelope], compression: Compression) -> Result<Bytes> {
    let batch = envelopes_to_batch(envelopes)?;
    write_batches(&[batch], compression)
}

pub fn write_batches(batches: &[RecordBatch], compression: Compression) -> Result<Bytes> {
    let props = WriterProperties::builder()
        .set_compression(compression.into())
        .set_max_row_group_size(ROW_GROUP_SIZE)
        .build();

    let mut buf = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buf, schema(), Some(props))?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.close()?;
    }
    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use causality_contracts::Payload;

    fn sample_envelope(id: &str) -> Envelope {
        Envelope {
            id: id.to_string(),
            app_id: "demo".to_string(),
            device_id: "device-1".to_string(),
            timestamp_ms: 1_700_000_000_000,
            correlation_id: None,
            idempotency_key: None,
            device_context: None,
            payload: Payload::ScreenView {
                screen_name: "home".to_string(),
                previous_screen: None,
            },
        }
    }

    #[test]
    fn encodes_a_single_envelope_into_one_row() {
        let envelopes = vec![sample_envelope("evt-1")];
        let batch = envelopes_to_batch(&envelopes).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 17);
    }

    #[test]
    fn encode_envelopes_produces_nonempty_parquet_bytes() {
        let envelopes = vec![sample_envelope("evt-1"), sample_envelope("evt-2")];
        let bytes = encode_envelopes(&envelopes, Compression::Snappy).unwrap();
        assert!(!bytes.is_empty());
        // Parquet files start with the magic bytes "PAR1".
        assert_eq!(&bytes[0..4], b"PAR1");
    }
}
