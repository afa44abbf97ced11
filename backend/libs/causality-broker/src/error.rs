use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("broker timeout")]
    Timeout,

    #[error("message not found: stream {stream} seq {seq}")]
    NotFound { stream: String, seq: u64 },

    #[error("ack failed: {0}")]
    AckFailed(String),
}
