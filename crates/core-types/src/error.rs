use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Risk limit '{0}' is out of range: {1}")]
    InvalidLimit(&'static str, String),
}
