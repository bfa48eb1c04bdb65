/// Domain-specific error types for the pricing service.
/// Degenerate arithmetic is floored/clamped in the models and never raised here.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model computation error: {0}")]
    Model(String),

    #[error("config error: {0}")]
    Config(String),
}

impl PricingError {
    /// True when the failure was caused by the caller's parameters.
    /// Only affects logging and counters; every failure maps to the same status.
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(self, PricingError::InvalidInput(_))
    }
}

pub type PricingResult<T> = Result<T, PricingError>;
