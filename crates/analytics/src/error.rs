use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Return variance {0} has no square root")]
    Variance(rust_decimal::Decimal),
}
