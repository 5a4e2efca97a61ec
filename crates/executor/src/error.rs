use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// The venue refused the order. Nothing was filled.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// No fill arrived within the order timeout.
    #[error("Order timed out after {0} seconds")]
    Timeout(u64),

    #[error("Not enough cash available to execute trade. Required: {required}, Available: {available}")]
    InsufficientCash { required: String, available: String },

    #[error("Position not found: {0}")]
    PositionNotFound(Uuid),

    #[error("Invalid order quantity for closing position. Requested: {requested}, Available: {available}")]
    InvalidClosingQuantity { requested: String, available: String },

    #[error("An unexpected portfolio state was encountered: {0}")]
    PortfolioError(String),
}
