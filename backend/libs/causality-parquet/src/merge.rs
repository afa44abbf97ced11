//! Merge several small Parquet files (same schema) into one, for the
//! compaction engine: row groups from each input are concatenated into
//! a single new file of the same schema.

use crate::encode::{write_batches, Compression};
use crate::error::{ParquetCodecError, Result};
use crate::schema::schema;
use arrow::compute::concat_batches;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::io::Cursor;

/// Total row count across a set of already-decoded Parquet buffers,
/// without materializing them — used by the compactor's post-merge
/// invariant check ("row count unchanged").
pub fn count_rows(files: &[Bytes]) -> Result<i64> {
    let mut total = 0i64;
    for file in files {
        let reader = ParquetRecordBatchReaderBuilder::try_new(Cursor::new(file.clone()))?;
        total += reader.metadata().file_metadata().num_rows();
    }
    Ok(total)
}

pub fn merge_parquet_files(files: &[Bytes], compression: Compression) -> Result<Bytes> {
    if files.is_empty() {
        return Err(ParquetCodecError::EmptyInput);
    }

    let expected_schema = schema();
    let mut batches = Vec::new();

    for file in files {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Cursor::new(file.clone()))?;
        if builder.schema().fields() != expected_schema.fields() {
            return Err(ParquetCodecError::SchemaMismatch);
        }
        let reader = builder.build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }

    let merged = concat_batches(&expected_schema, &batches)?;
    write_batches(&[merged], compression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_envelopes;
    use causality_contracts::{Envelope, Payload};

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
    fn merging_preserves_total_row_count() {
        let file_a = encode_envelopes(&[sample_envelope("a1"), sample_envelope("a2")], Compression::Snappy)
            .unwrap();
        let file_b = encode_envelopes(&[sample_envelope("b1")], Compression::Snappy).unwrap();

        let files = vec![file_a.clone(), file_b.clone()];
        let before = count_rows(&files).unwrap();

        let merged = merge_parquet_files(&files, Compression::Snappy).unwrap();
        let after = count_rows(&[merged]).unwrap();

        assert_eq!(before, 3);
        assert_eq!(after, 3);
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(merge_parquet_files(&[], Compression::Snappy).is_err());
    }
}
