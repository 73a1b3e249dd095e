//! Library error type

/// Errors raised by the library
///
/// Numerical trouble during an update (non-finite gradients, line search
/// exhaustion, ...) is not an error: it is reported as a rejected update in
/// [`UpdateOutcome`](crate::algo::trpo::UpdateOutcome).
#[derive(Debug, thiserror::Error)]
pub enum TrpoError {
    #[error("malformed trajectory: {0}")]
    MalformedTrajectory(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrpoError>;
