//! The seam between the delivery agent and the network.

use async_trait::async_trait;
use postage_common::{Mailbox, Result, TransportSettings};
use postage_message::WireMessage;

/// Reverse path and forward paths for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Empty for the null reverse path.
    pub sender: String,
    pub recipients: Vec<String>,
}

impl Envelope {
    /// The envelope implied by an assembled message: the `Sender` mailbox if
    /// present, otherwise `From`, and every `To`, `Cc` and `Bcc` recipient.
    #[must_use]
    pub fn from_message(message: &WireMessage) -> Self {
        Self {
            sender: message
                .sender()
                .or_else(|| message.from())
                .map(Mailbox::address)
                .unwrap_or_default(),
            recipients: message.all_recipients().map(Mailbox::address).collect(),
        }
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens, negotiates and, when configured, authenticates a session.
    ///
    /// # Errors
    ///
    /// A connection error when the session cannot be established.
    async fn connect(&self, settings: &TransportSettings) -> Result<Box<dyn Transport>>;
}

/// An open session that messages can be sent over, one at a time.
#[async_trait]
pub trait Transport: Send {
    /// Transmits one rendered message.
    ///
    /// # Errors
    ///
    /// A transmission error when the server refuses the message or the
    /// session fails. The transport stays usable after a refusal.
    async fn send_message(&mut self, envelope: &Envelope, data: &[u8]) -> Result<()>;

    /// Ends the session. Further sends fail.
    ///
    /// # Errors
    ///
    /// A connection error when the session could not be ended cleanly.
    async fn close(&mut self) -> Result<()>;
}
