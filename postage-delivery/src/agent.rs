//! Connection lifecycle and batch transmission.
//!
//! Every batch goes `Disconnected -> Connected -> Sending* -> Closed` on one
//! connection, which is closed exactly once however the batch ends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use postage_common::{MailError, Properties, Result, TransportSettings, internal};
use postage_message::{Mail, MessageAssembler};

use crate::{
    observer::{DeliveryObserver, TracingObserver},
    policy::FailurePolicy,
    report::{DeliveryReport, MailOutcome},
    smtp::SmtpConnector,
    transport::{Connector, Envelope, Transport},
};

/// Sends batches of mail over connections opened by its [`Connector`].
pub struct DeliveryAgent {
    connector: Box<dyn Connector>,
    observer: Arc<dyn DeliveryObserver>,
}

impl Default for DeliveryAgent {
    fn default() -> Self {
        Self::new(SmtpConnector)
    }
}

impl DeliveryAgent {
    /// An agent reporting through [`TracingObserver`].
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            observer: Arc::new(TracingObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Opens a transport configured by `properties`.
    ///
    /// # Errors
    ///
    /// A connection error when the properties do not describe a usable
    /// transport or the session cannot be opened.
    pub async fn connect(&self, properties: &Properties) -> Result<Box<dyn Transport>> {
        let settings = TransportSettings::from_properties(properties).map_err(MailError::connection)?;

        internal!(
            level = DEBUG,
            "Connecting to {} over {}{}",
            settings.address(),
            settings.protocol,
            if settings.credentials.is_some() {
                " with authentication"
            } else {
                ""
            }
        );
        self.connector.connect(&settings).await
    }

    /// Sends one mail, stopping on failure.
    ///
    /// # Errors
    ///
    /// See [`Self::send_batch`] with [`FailurePolicy::Abort`].
    pub async fn send(&self, properties: &Properties, mail: &Mail) -> Result<DeliveryReport> {
        self.send_batch(properties, FailurePolicy::Abort, std::slice::from_ref(mail))
            .await
    }

    /// Sends `mails` in order over a single connection.
    ///
    /// Every message of the batch is stamped with the same sent date. An
    /// empty batch returns at once without connecting. Under
    /// [`FailurePolicy::BestEffort`] connection and per-mail failures are
    /// reported to the observer and recorded in the report; under
    /// [`FailurePolicy::Abort`] the first one is returned and later mails are
    /// not attempted.
    ///
    /// # Errors
    ///
    /// Precondition violations under either policy; under `Abort`, the first
    /// connection or transmission failure.
    pub async fn send_batch(
        &self,
        properties: &Properties,
        policy: FailurePolicy,
        mails: &[Mail],
    ) -> Result<DeliveryReport> {
        let sent_at = Utc::now();
        let mut report = DeliveryReport::new(sent_at, mails.len());

        if mails.is_empty() {
            internal!("Empty batch, nothing to send");
            return Ok(report);
        }

        internal!(
            level = INFO,
            "Sending {} mail(s) with policy {}",
            mails.len(),
            policy
        );

        let mut transport = match self.connect(properties).await {
            Ok(transport) => transport,
            Err(error) if policy.suppresses(&error) => {
                self.observer.connection_failed(&error);
                report.set_connection_failure(error.to_string());
                return Ok(report);
            }
            Err(error) => return Err(error),
        };

        let assembler = MessageAssembler::from_properties(properties);
        let result = self
            .send_all(
                transport.as_mut(),
                &assembler,
                mails,
                sent_at,
                policy,
                &mut report,
            )
            .await;

        if let Err(error) = transport.close().await {
            self.observer.close_failed(&error);
        }

        internal!(level = INFO, "Batch finished: {}", report);
        result.map(|()| report)
    }

    async fn send_all(
        &self,
        transport: &mut dyn Transport,
        assembler: &MessageAssembler,
        mails: &[Mail],
        sent_at: DateTime<Utc>,
        policy: FailurePolicy,
        report: &mut DeliveryReport,
    ) -> Result<()> {
        for (index, mail) in mails.iter().enumerate() {
            let outcome = self
                .send_one(transport, assembler, mail, sent_at, policy)
                .await?;
            report.record(index, outcome);
        }
        Ok(())
    }

    /// Assembles `mail`, stamps it with `sent_at` and transmits it to every
    /// recipient on the assembled message.
    ///
    /// # Errors
    ///
    /// Precondition violations always; other failures only under
    /// [`FailurePolicy::Abort`]. Under `BestEffort` they are reported to the
    /// observer and returned as [`MailOutcome::Failed`].
    pub async fn send_one(
        &self,
        transport: &mut dyn Transport,
        assembler: &MessageAssembler,
        mail: &Mail,
        sent_at: DateTime<Utc>,
        policy: FailurePolicy,
    ) -> Result<MailOutcome> {
        match transmit(transport, assembler, mail, sent_at).await {
            Ok(message_id) => {
                self.observer.mail_sent(mail, &message_id);
                Ok(MailOutcome::Sent { message_id })
            }
            Err(error) if policy.suppresses(&error) => {
                self.observer.mail_failed(mail, &error);
                Ok(MailOutcome::Failed {
                    reason: error.to_string(),
                })
            }
            Err(error) => Err(error),
        }
    }
}

async fn transmit(
    transport: &mut dyn Transport,
    assembler: &MessageAssembler,
    mail: &Mail,
    sent_at: DateTime<Utc>,
) -> Result<String> {
    let mut message = assembler.create_message(mail)?;
    message.set_sent_date(sent_at);

    let envelope = Envelope::from_message(&message);
    let data = message.to_bytes()?;
    transport.send_message(&envelope, &data).await?;

    Ok(message.message_id().to_string())
}
