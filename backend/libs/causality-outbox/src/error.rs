use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutboxError>;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("delivery row not found")]
    NotFound,
}
