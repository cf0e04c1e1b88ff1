// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::borrow::Cow;

use crate::UpdateState;

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error from a cache operation.
///
/// Expected outcomes such as "the key already exists" or "the key is absent" are never
/// reported through this type; they are part of the regular return values. An `Error`
/// means the call was rejected (validation, configuration) or a backend failed.
///
/// # Examples
///
/// ```
/// use strata_tier::{Error, ErrorKind};
///
/// let error = Error::invalid_argument("key must not be empty");
/// assert!(matches!(error.kind(), ErrorKind::InvalidArgument(_)));
/// ```
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// The category of an [`Error`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A required argument was missing, empty or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),

    /// The cache or one of its handles is configured inconsistently.
    #[error("invalid configuration: {0}")]
    Configuration(Cow<'static, str>),

    /// The requested operation is not supported by any configured handle.
    #[error("unsupported operation: {0}")]
    Unsupported(Cow<'static, str>),

    /// A backplane message could not be decoded.
    #[error("malformed backplane message: {0}")]
    Deserialization(Cow<'static, str>),

    /// An update was requested with hard failure semantics and did not succeed.
    #[error("update of '{key}' failed with state {state:?}")]
    UpdateFailed {
        /// The key that could not be updated.
        key: String,
        /// The terminal state of the update.
        state: UpdateState,
    },

    /// A bounded retry loop ran out of attempts.
    #[error("could not complete '{operation}' for '{key}' within {attempts} attempts")]
    RetriesExhausted {
        /// The operation that gave up.
        operation: &'static str,
        /// The key involved.
        key: String,
        /// The number of attempts made.
        attempts: u32,
    },

    /// A backend or transport failed.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Creates a validation error.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::InvalidArgument(message.into()))
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::Configuration(message.into()))
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::Unsupported(message.into()))
    }

    /// Creates a wire-format decoding error.
    pub fn deserialization(message: impl Into<Cow<'static, str>>) -> Self {
        Self(ErrorKind::Deserialization(message.into()))
    }

    /// Creates an error for an update that did not reach [`UpdateState::Success`].
    pub fn update_failed(key: impl Into<String>, state: UpdateState) -> Self {
        Self(ErrorKind::UpdateFailed { key: key.into(), state })
    }

    /// Creates an error for a retry loop that exhausted its budget.
    pub fn retries_exhausted(operation: &'static str, key: impl Into<String>, attempts: u32) -> Self {
        Self(ErrorKind::RetriesExhausted {
            operation,
            key: key.into(),
            attempts,
        })
    }

    /// Wraps a backend or transport failure.
    ///
    /// This is the entry point for external backends to surface their own errors.
    pub fn from_backend(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(ErrorKind::Backend(cause.into()))
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Returns `true` if the error was caused by an invalid argument.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.0, ErrorKind::InvalidArgument(_))
    }

    /// Returns `true` if the error was caused by an invalid configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self.0, ErrorKind::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn invalid_argument_display() {
        let error = Error::invalid_argument("key must not be empty");

        assert!(error.is_invalid_argument());
        assert_eq!(error.to_string(), "invalid argument: key must not be empty");
    }

    #[test]
    fn configuration_display() {
        let error = Error::configuration("no handles");

        assert!(error.is_configuration());
        assert!(!error.is_invalid_argument());
        assert_eq!(error.to_string(), "invalid configuration: no handles");
    }

    #[test]
    fn update_failed_carries_state() {
        let error = Error::update_failed("key", UpdateState::TooManyRetries);

        match error.kind() {
            ErrorKind::UpdateFailed { key, state } => {
                assert_eq!(key, "key");
                assert_eq!(*state, UpdateState::TooManyRetries);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn backend_error_is_transparent() {
        let error = Error::from_backend("connection reset");
        assert_eq!(error.to_string(), "connection reset");
    }

    #[test]
    fn result_type_alias_propagates_errors() {
        fn returns_err() -> Result<i32> {
            Err(Error::unsupported("key enumeration"))
        }

        let err = returns_err().expect_err("should return an error");
        assert!(err.to_string().contains("key enumeration"));
    }
}
