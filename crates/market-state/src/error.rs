use thiserror::Error;

/// Errors produced while turning a raw snapshot into an observation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketStateError {
    /// A required field is missing or unusable. The tick is skipped, never partially filled.
    #[error("Snapshot for {instrument} is incomplete: missing '{field}'")]
    DataIncomplete { instrument: String, field: String },

    #[error("Invalid feature schema: {0}")]
    InvalidSchema(String),
}

/// Errors raised by a data collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Data source unavailable: {0}")]
    Unavailable(String),

    #[error("Data source returned a malformed snapshot: {0}")]
    Malformed(String),
}
