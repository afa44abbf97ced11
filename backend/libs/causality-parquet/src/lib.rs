//! Parquet encoding and merge for the warehouse sink and compaction
//! engine. The schema is fixed and shared between both, built directly
//! on the `arrow`/`parquet` APIs.

pub mod encode;
pub mod error;
pub mod merge;
pub mod schema;

pub use encode::{encode_envelopes, Compression};
pub use error::{ParquetCodecError, Result};
pub use merge::{count_rows, merge_parquet_files};
