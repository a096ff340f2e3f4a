//! Crate-level error type

use thiserror::Error;

use crate::any::BadAnyCast;
use crate::boxed::BoxError;
use crate::convert::ConversionError;
use crate::dispatch::{DispatchError, InvokeError};
use crate::meta::MetaError;
use crate::options::ConfigError;

/// Any failure raised by the Carbon core
#[derive(Debug, Error)]
pub enum Error {
    /// Erased cast mismatch
    #[error(transparent)]
    BadCast(#[from] BadAnyCast),

    /// Boxed value access failure
    #[error(transparent)]
    Value(#[from] BoxError),

    /// Conversion failure
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Callable failure outside dispatch
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Dispatch failure
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Reflection failure
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias using [`Error`]
pub type CarbonResult<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> CarbonResult<()> {
        Err::<(), _>(DispatchError::UnknownCommand {
            name: "x".to_string(),
            suggestion: Some("y".to_string()),
        })?;
        Ok(())
    }

    #[test]
    fn test_from_and_display() {
        let err = lookup().unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
        assert_eq!(err.to_string(), "Unknown command: x (did you mean 'y'?)");

        let err: Error = ConversionError::SourceTypeNotFound("Foo".to_string()).into();
        assert_eq!(err.to_string(), "Source type not found: Foo");
    }
}
