use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParquetCodecError>;

#[derive(Debug, Error)]
pub enum ParquetCodecError {
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("cannot merge files with differing schemas")]
    SchemaMismatch,

    #[error("no input files to merge")]
    EmptyInput,
}
