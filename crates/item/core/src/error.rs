//! Error taxonomy shared by every public engine operation.

use thiserror::Error;

/// Stable classification attached to every [`EngineError`].
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    DependencyMissing,
    OperationFailed,
    NotSupported,
    OutOfRange,
    Conflict,
}

/// Failure reported by an engine operation.
///
/// Each variant maps one-to-one onto an [`ErrorCode`] and carries a
/// human-readable message. Nothing in the engine panics for these cases;
/// callers inspect the code to decide whether to retry or give up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::DependencyMissing(_) => ErrorCode::DependencyMissing,
            Self::OperationFailed(_) => ErrorCode::OperationFailed,
            Self::NotSupported(_) => ErrorCode::NotSupported,
            Self::OutOfRange(_) => ErrorCode::OutOfRange,
            Self::Conflict(_) => ErrorCode::Conflict,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m)
            | Self::NotFound(m)
            | Self::DependencyMissing(m)
            | Self::OperationFailed(m)
            | Self::NotSupported(m)
            | Self::OutOfRange(m)
            | Self::Conflict(m) => m,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::OperationFailed(format!("serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by a host [`ItemAccessor`](crate::ItemAccessor).
///
/// Accessors never see [`EngineError`]; the engine converts at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("attribute missing: {0}")]
    Missing(String),

    #[error("capability not supported: {0}")]
    Unsupported(String),

    #[error("accessor call failed: {0}")]
    Failed(String),

    #[error("attribute could not be converted: {0}")]
    Serialization(String),
}

impl From<AccessError> for EngineError {
    fn from(error: AccessError) -> Self {
        match error {
            AccessError::Missing(m) => Self::NotFound(m),
            AccessError::Unsupported(m) => Self::NotSupported(m),
            AccessError::Failed(m) | AccessError::Serialization(m) => Self::OperationFailed(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_access_error_conversion() {
        let missing: EngineError = AccessError::Missing("quality".into()).into();
        assert_eq!(missing.code(), ErrorCode::NotFound);

        let unsupported: EngineError = AccessError::Unsupported("stats".into()).into();
        assert_eq!(unsupported.code(), ErrorCode::NotSupported);

        let failed: EngineError = AccessError::Failed("setter threw".into()).into();
        assert_eq!(failed.code(), ErrorCode::OperationFailed);
        assert_eq!(failed.message(), "setter threw");
    }

    #[test]
    fn test_error_code_names() {
        assert_eq!(ErrorCode::OutOfRange.to_string(), "out_of_range");
        assert_eq!(
            ErrorCode::from_str("dependency_missing").unwrap(),
            ErrorCode::DependencyMissing
        );
    }
}
