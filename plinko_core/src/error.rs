use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlinkoError {
    /// No payout table for the requested (risk, rows), or a table failed validation.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("insufficient balance: bet {bet} exceeds balance {balance}")]
    InsufficientBalance { balance: f64, bet: f64 },
    #[error("storage failure: {0}")]
    Persistence(String),
}

impl PlinkoError {
    /// Errors caused by a single bad request; state is untouched and the
    /// caller may retry with different input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlinkoError::Validation(_) | PlinkoError::InsufficientBalance { .. }
        )
    }
}

pub type PlinkoResult<T> = Result<T, PlinkoError>;
