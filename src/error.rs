use thiserror::Error;

/// Errors surfaced by the scheduling core.
///
/// Contract violations (bad quality, malformed state) are reported as-is and
/// never corrected on the caller's behalf.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrillError {
    #[error("quality rating {0} is outside 0..=5")]
    InvalidQuality(i32),

    #[error("invalid item state: {0}")]
    InvalidState(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no item is awaiting a rating")]
    NoItemInFlight,

    #[error("session has already ended")]
    SessionEnded,
}

pub type Result<T> = std::result::Result<T, DrillError>;
