//! Hooks the agent reports delivery events through.

use postage_common::MailError;
use postage_message::Mail;

/// Receives the failures a batch records instead of returning.
///
/// Only `connection_failed` and `mail_failed` are required; the rest default
/// to doing nothing.
pub trait DeliveryObserver: Send + Sync {
    /// The connection could not be opened and nothing was sent.
    fn connection_failed(&self, error: &MailError);

    /// `mail` was not delivered; the batch continues.
    fn mail_failed(&self, mail: &Mail, error: &MailError);

    fn mail_sent(&self, _mail: &Mail, _message_id: &str) {}

    /// Closing the transport failed. The error is otherwise discarded.
    fn close_failed(&self, _error: &MailError) {}
}

/// Writes every event as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn connection_failed(&self, error: &MailError) {
        tracing::warn!(%error, "Unable to connect, no mail was sent");
    }

    fn mail_failed(&self, mail: &Mail, error: &MailError) {
        tracing::warn!(
            subject = mail.subject().unwrap_or_default(),
            %error,
            "Mail was not sent"
        );
    }

    fn mail_sent(&self, mail: &Mail, message_id: &str) {
        tracing::info!(
            subject = mail.subject().unwrap_or_default(),
            message_id,
            "Mail sent"
        );
    }

    fn close_failed(&self, error: &MailError) {
        tracing::debug!(%error, "Ignoring failure while closing the transport");
    }
}
