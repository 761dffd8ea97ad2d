use thiserror::Error;

/// Why a submission was turned away at the door. Rejections are synchronous:
/// a rejected job never enters the queue or the worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unsupported file type: {extension}")]
    UnsupportedType { extension: String },

    #[error("rate limit exceeded for client {client}")]
    RateLimited { client: String },

    #[error("job queue is full")]
    QueueFull,

    #[error("service is shutting down")]
    ServiceShuttingDown,
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("job rejected: {0}")]
    Rejected(#[from] RejectionReason),

    /// The caller's own wait timed out. Independent of the job deadline; the
    /// job keeps running and is still bounded by its deadline.
    #[error("timed out waiting for job result")]
    AwaitTimeout,

    #[error("job result channel closed before a terminal state was reached")]
    ResultChannelClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
