//! The uniform error surface shared by message assembly and delivery.
//!
//! Every failure the library reports is a [`MailError`]. Precondition
//! violations carry only a message; every other kind wraps the original cause
//! so callers can walk [`std::error::Error::source`] for diagnostics.

use std::error::Error as StdError;

use thiserror::Error;

use crate::{address::AddressError, config::ConfigError};

/// Boxed underlying cause carried by the non-precondition kinds.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced while describing, assembling or delivering mail.
#[derive(Debug, Error)]
pub enum MailError {
    /// A required argument or field was missing or blank.
    ///
    /// Never suppressed by a failure policy.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An address field could not be parsed.
    #[error("Invalid address '{input}': {source}")]
    AddressSyntax {
        input: String,
        #[source]
        source: AddressError,
    },

    /// The wire message could not be built or rendered.
    #[error("Failed to assemble message: {source}")]
    Assembly {
        #[source]
        source: Cause,
    },

    /// Configuration could not be resolved into transport settings.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Opening, negotiating or authenticating the transport failed.
    #[error("Connection failed: {source}")]
    Connection {
        #[source]
        source: Cause,
    },

    /// Transmitting an assembled message failed.
    #[error("Transmission failed: {source}")]
    Transmission {
        #[source]
        source: Cause,
    },
}

/// Specialized `Result` type for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Builds a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Wraps an assembly failure.
    pub fn assembly(source: impl Into<Cause>) -> Self {
        Self::Assembly {
            source: source.into(),
        }
    }

    /// Wraps a connection failure.
    pub fn connection(source: impl Into<Cause>) -> Self {
        Self::Connection {
            source: source.into(),
        }
    }

    /// Wraps a transmission failure.
    pub fn transmission(source: impl Into<Cause>) -> Self {
        Self::Transmission {
            source: source.into(),
        }
    }

    /// Returns `true` for precondition violations.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Returns `true` if the failure happened while connecting.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Configuration(_))
    }

    /// Returns `true` if the failure happened while transmitting.
    #[must_use]
    pub const fn is_transmission(&self) -> bool {
        matches!(self, Self::Transmission { .. })
    }
}

/// Fails with [`MailError::Precondition`] unless `condition` holds.
///
/// # Errors
///
/// Returns a precondition error carrying `message` when `condition` is false.
pub fn check_argument(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(MailError::precondition(message))
    }
}

/// Returns `true` when the value is absent or only whitespace.
#[must_use]
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
