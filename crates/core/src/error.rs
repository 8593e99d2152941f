// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every benchwatch crate.

use thiserror::Error;

/// Errors produced while ingesting results or answering queries.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload is malformed or misses a required field.
    #[error("{0}")]
    Validation(String),

    /// A named dimension does not exist and may not be auto-created.
    #[error("{0}")]
    Reference(String),

    /// A lookup by id or commit prefix found nothing.
    #[error("{0}")]
    NotFound(String),

    /// The remote commit log could not be queried.
    #[error("Commit log lookup failed: {0}")]
    RemoteLookup(String),

    /// The database rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a reference error.
    pub fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Reference(_) => "REFERENCE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RemoteLookup(_) => "REMOTE_LOOKUP_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the caller sent something wrong, as opposed to a server fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Reference(_) | Self::NotFound(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for benchwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(Error::validation("x").is_client_error());
        assert!(Error::reference("x").is_client_error());
        assert!(Error::not_found("x").is_client_error());
        assert!(!Error::Storage("x".into()).is_client_error());
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = Error::validation("Key 'project' missing from request");
        assert_eq!(err.to_string(), "Key 'project' missing from request");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
