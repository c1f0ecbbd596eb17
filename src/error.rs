use thiserror::Error;

/// Failures surfaced by normalization and calculation.
///
/// Each variant names the offending parameter key (where there is one) so the
/// caller can ask the user about that specific input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid raw parameter '{key}': {reason}")]
    Validation { key: String, reason: String },

    #[error("missing required parameter '{key}'")]
    MissingParameter { key: String },

    #[error("parameter '{key}' out of range: {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("IRR did not converge within {iterations} iterations")]
    NoConvergence { iterations: u32 },
}

impl ModelError {
    pub(crate) fn validation(key: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// The parameter key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Validation { key, .. }
            | Self::MissingParameter { key }
            | Self::InvalidParameter { key, .. } => Some(key),
            Self::NoConvergence { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
