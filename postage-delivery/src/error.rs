//! Failures raised inside the SMTP transport.
//!
//! The agent only ever sees [`MailError`](postage_common::MailError); these
//! are wrapped as its cause, as a connection error while the session is being
//! opened and as a transmission error once a message is in flight.

use postage_smtp::client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Protocol, network or TLS failure reported by the client.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// TLS is required but the server does not offer it or the upgrade failed.
    #[error("TLS required: {0}")]
    TlsRequired(String),

    /// The rendered message exceeds the size the server announced.
    #[error("Message too large: {size} octets exceeds the server limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// The assembled message has no envelope recipients.
    #[error("Message has no recipients")]
    NoRecipients,

    /// The transport was used after `close`.
    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if retrying the same message cannot succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self {
            Self::Client(error) => error.is_permanent(),
            Self::TlsRequired(_) | Self::MessageTooLarge { .. } | Self::NoRecipients => true,
            Self::Closed => false,
        }
    }

    /// Returns `true` if the session can no longer be used.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Closed
                | Self::Client(
                    ClientError::Io(_)
                        | ClientError::ConnectionClosed
                        | ClientError::Timeout(_)
                        | ClientError::TlsError(_)
                        | ClientError::ParseError(_)
                        | ClientError::Utf8Error(_)
                )
        )
    }
}
