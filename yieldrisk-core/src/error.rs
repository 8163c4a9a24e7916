//! Error types for the scoring engine

use thiserror::Error;

/// Errors raised by the risk scoring engine and its numeric helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("invalid input `{field}`: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl RiskError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RiskError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending input field
    pub fn field(&self) -> &'static str {
        match self {
            RiskError::InvalidInput { field, .. } => field,
        }
    }
}

/// Reject NaN and infinite values for the named field
pub(crate) fn ensure_finite(field: &'static str, value: f64) -> Result<f64, RiskError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RiskError::invalid(
            field,
            format!("must be finite (got {})", value),
        ))
    }
}
