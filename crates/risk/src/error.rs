use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("The provided reference price ({0}) is zero or negative.")]
    InvalidReferencePrice(Decimal),
}
