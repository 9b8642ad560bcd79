//! Top-level error type for warden
//!
//! Flattens the per-module error enums into the categories callers act on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::confirmation::ConfirmationError;
use crate::integrity::{HashStoreError, IntegrityError};
use crate::policy::OracleError;
use crate::provider::ProviderError;
use crate::routing::{ChainError, RoutingError};

/// Top-level error type for warden operations
///
/// - [`Error::Auth`] - Fix credentials and retry
/// - [`Error::RateLimited`] - Back off and retry
/// - [`Error::Network`] - Check connectivity, retry
/// - [`Error::Unavailable`] - Service is down, wait and retry
/// - [`Error::Model`] - Model missing or model-side failure
/// - [`Error::Policy`] - Policy oracle failed
/// - [`Error::Integrity`] - Policy directory or hash store could not be read or written
/// - [`Error::Confirmation`] - Nobody could answer a confirmation request
/// - [`Error::Config`] - Fix configuration
/// - [`Error::Cancelled`] - The caller aborted the operation
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication failed (invalid or expired credentials)
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limited - slow down requests
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network connectivity issue
    #[error("network error: {0}")]
    Network(String),

    /// Service temporarily unavailable
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Model error (not found, quota exhausted, content filtered, etc.)
    #[error("model error: {0}")]
    Model(String),

    /// Policy oracle error
    #[error("policy error: {0}")]
    Policy(String),

    /// Integrity check or hash store failure
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Confirmation bus error
    #[error("confirmation error: {0}")]
    Confirmation(String),

    /// Configuration error (bad chain, unreadable config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation cancelled
    #[error("cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this is an authentication error
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Returns true if this is a rate limiting error
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Returns true if this is an integrity error
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Returns true if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if this error is potentially retryable
    ///
    /// Retryable errors include rate limiting, network issues, and service
    /// unavailability.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Network(_) | Self::Unavailable(_)
        )
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Authentication(msg) => Self::Auth(msg),
            ProviderError::RateLimited(msg) => Self::RateLimited(msg),
            ProviderError::Network(msg) => Self::Network(msg),
            ProviderError::ServiceUnavailable(msg) => Self::Unavailable(msg),
            ProviderError::QuotaExhausted(msg) => Self::Model(format!("quota exhausted: {}", msg)),
            ProviderError::NotFound(msg) => Self::Model(format!("not found: {}", msg)),
            ProviderError::Model(msg) => Self::Model(msg),
            ProviderError::Configuration(msg) => Self::Config(msg),
            ProviderError::Server { status, message } => match status {
                429 => Self::RateLimited(message),
                500 | 502 | 503 | 504 => Self::Unavailable(message),
                _ => Self::Model(format!("server error {}: {}", status, message)),
            },
            ProviderError::Cancelled => Self::Cancelled,
            ProviderError::Other(msg) => Self::Other(msg),
        }
    }
}

impl From<RoutingError> for Error {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Cancelled => Self::Cancelled,
            RoutingError::Failed { source, .. } => source.into(),
        }
    }
}

impl From<OracleError> for Error {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Provider(e) => e.into(),
            other => Self::Policy(other.to_string()),
        }
    }
}

impl From<IntegrityError> for Error {
    fn from(err: IntegrityError) -> Self {
        Self::Integrity(err.to_string())
    }
}

impl From<HashStoreError> for Error {
    fn from(err: HashStoreError) -> Self {
        Self::Integrity(err.to_string())
    }
}

impl From<ConfirmationError> for Error {
    fn from(err: ConfirmationError) -> Self {
        Self::Confirmation(err.to_string())
    }
}

impl From<ChainError> for Error {
    fn from(err: ChainError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for warden operations
pub type Result<T> = std::result::Result<T, Error>;
