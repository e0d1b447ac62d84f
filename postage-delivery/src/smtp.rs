//! SMTP implementation of the transport seam.
//!
//! Opening a session:
//! 1. Connect (plain TCP for `smtp`, implicit TLS for `smtps`) and read the greeting
//! 2. EHLO, falling back to HELO when EHLO is refused
//! 3. STARTTLS on plain connections, according to the TLS policy
//! 4. AUTH when credentials are configured
//!
//! Each message is then MAIL FROM, one RCPT TO per recipient and DATA. A
//! refused message is followed by RSET so the session can carry the next one.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use postage_common::{
    Credentials, MailError, Protocol, Result, TlsPolicy, TransportSettings, internal,
};
use postage_smtp::client::{AuthMechanism, ClientError, Response, SmtpClient};

use crate::{
    error::TransportError,
    transport::{Connector, Envelope, Transport},
};

/// DATA may take this many times the per-command timeout.
const DATA_TIMEOUT_FACTOR: u32 = 4;

/// Runs one client step, failing with [`ClientError::Timeout`] after `limit`.
async fn timed<T>(
    command: &str,
    limit: Duration,
    step: impl Future<Output = std::result::Result<T, ClientError>>,
) -> std::result::Result<T, ClientError> {
    tokio::time::timeout(limit, step)
        .await
        .map_err(|_| ClientError::Timeout(command.to_string()))?
}

/// Opens [`SmtpTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

#[async_trait]
impl Connector for SmtpConnector {
    async fn connect(&self, settings: &TransportSettings) -> Result<Box<dyn Transport>> {
        let transport = SmtpTransport::open(settings)
            .await
            .map_err(MailError::connection)?;
        Ok(Box::new(transport))
    }
}

/// An established SMTP session.
pub struct SmtpTransport {
    client: SmtpClient,
    settings: TransportSettings,
    closed: bool,
}

impl SmtpTransport {
    /// Connects, negotiates TLS and authenticates according to `settings`.
    ///
    /// When opportunistic STARTTLS fails the session is reopened without it.
    ///
    /// # Errors
    ///
    /// Fails when any step of opening the session fails.
    pub async fn open(settings: &TransportSettings) -> std::result::Result<Self, TransportError> {
        if settings.accept_invalid_certs {
            tracing::warn!(
                server = %settings.address(),
                "TLS certificate validation is disabled for this connection"
            );
        }

        let mut transport = Self::establish(settings).await?;

        if settings.protocol == Protocol::Smtp {
            match transport.negotiate_tls().await {
                Ok(()) => {}
                Err(error) if settings.tls_policy == TlsPolicy::Opportunistic => {
                    tracing::info!(
                        server = %settings.address(),
                        %error,
                        "STARTTLS failed, reconnecting without TLS"
                    );
                    transport = Self::establish(settings).await?;
                }
                Err(error) => return Err(error),
            }
        }

        if let Some(credentials) = &settings.credentials {
            transport.authenticate(credentials).await?;
        }

        internal!(
            level = DEBUG,
            "Session open with {} (tls: {})",
            settings.address(),
            transport.client.is_tls()
        );
        Ok(transport)
    }

    /// Connects, reads the greeting and says hello.
    async fn establish(settings: &TransportSettings) -> std::result::Result<Self, TransportError> {
        let limit = settings.command_timeout;
        let address = settings.address();

        let client = match settings.protocol {
            Protocol::Smtp => timed(
                "connect",
                limit,
                SmtpClient::connect(&address, settings.host.clone()),
            )
            .await?
            .accept_invalid_certs(settings.accept_invalid_certs),
            Protocol::Smtps => {
                timed(
                    "connect",
                    limit,
                    SmtpClient::connect_tls(
                        &address,
                        settings.host.clone(),
                        settings.accept_invalid_certs,
                    ),
                )
                .await?
            }
        };

        let mut transport = Self {
            client,
            settings: settings.clone(),
            closed: false,
        };

        timed("greeting", limit, transport.client.read_greeting())
            .await?
            .ensure("greeting", Response::is_success)?;
        transport.hello().await?;

        Ok(transport)
    }

    const fn limit(&self) -> Duration {
        self.settings.command_timeout
    }

    /// EHLO, or HELO when the server refuses EHLO.
    async fn hello(&mut self) -> std::result::Result<(), TransportError> {
        let limit = self.limit();
        let ehlo = timed(
            "EHLO",
            limit,
            self.client.ehlo(&self.settings.helo_domain),
        )
        .await?;

        if !ehlo.is_success() {
            internal!(
                level = DEBUG,
                "EHLO refused with {}, falling back to HELO",
                ehlo.code
            );
            timed(
                "HELO",
                limit,
                self.client.helo(&self.settings.helo_domain),
            )
            .await?
            .ensure("HELO", Response::is_success)?;
        }

        Ok(())
    }

    async fn negotiate_tls(&mut self) -> std::result::Result<(), TransportError> {
        match self.settings.tls_policy {
            TlsPolicy::Disabled => return Ok(()),
            TlsPolicy::Opportunistic if !self.client.capabilities().starttls => return Ok(()),
            TlsPolicy::Required if !self.client.capabilities().starttls => {
                return Err(TransportError::TlsRequired(
                    "Server does not advertise STARTTLS".to_string(),
                ));
            }
            TlsPolicy::Opportunistic | TlsPolicy::Required => {}
        }

        let response = timed("STARTTLS", self.limit(), self.client.starttls())
            .await
            .map_err(|e| TransportError::TlsRequired(e.to_string()))?;
        if !response.is_success() {
            return Err(TransportError::TlsRequired(format!(
                "Server rejected STARTTLS: {} {}",
                response.code,
                response.message()
            )));
        }

        // The extension list must be fetched again over the secured channel.
        self.hello().await?;
        tracing::debug!(
            server = %self.settings.address(),
            "TLS successfully negotiated via STARTTLS"
        );
        Ok(())
    }

    async fn authenticate(
        &mut self,
        credentials: &Credentials,
    ) -> std::result::Result<(), TransportError> {
        let mechanism = self
            .client
            .capabilities()
            .preferred_auth()
            .unwrap_or(AuthMechanism::Plain);

        internal!(
            level = DEBUG,
            "Authenticating as {} with {}",
            credentials.username,
            mechanism
        );
        timed(
            "AUTH",
            self.limit(),
            self.client
                .authenticate(mechanism, &credentials.username, &credentials.password),
        )
        .await?;
        Ok(())
    }

    async fn transact(
        &mut self,
        envelope: &Envelope,
        data: &[u8],
    ) -> std::result::Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if envelope.recipients.is_empty() {
            return Err(TransportError::NoRecipients);
        }

        let limit = self.limit();
        let announced = self.client.capabilities().size;
        if let Some(max) = announced.filter(|&max| max > 0 && data.len() > max) {
            return Err(TransportError::MessageTooLarge {
                size: data.len(),
                limit: max,
            });
        }

        let sender = self
            .settings
            .envelope_from
            .clone()
            .unwrap_or_else(|| envelope.sender.clone());
        let size = announced.map(|_| data.len());

        timed("MAIL FROM", limit, self.client.mail_from(&sender, size))
            .await?
            .ensure("MAIL FROM", Response::is_success)?;

        for recipient in &envelope.recipients {
            timed("RCPT TO", limit, self.client.rcpt_to(recipient))
                .await?
                .ensure("RCPT TO", Response::is_success)?;
        }

        let data_limit = limit * DATA_TIMEOUT_FACTOR;
        timed("DATA", limit, self.client.data())
            .await?
            .ensure("DATA", Response::is_intermediate)?;
        timed("message data", data_limit, self.client.send_data(data))
            .await?
            .ensure("message data", Response::is_success)?;

        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send_message(&mut self, envelope: &Envelope, data: &[u8]) -> Result<()> {
        match self.transact(envelope, data).await {
            Ok(()) => Ok(()),
            Err(error) => {
                if error.is_fatal() {
                    // The stream may hold a late reply or half a message.
                    self.closed = true;
                    internal!(level = DEBUG, "Session retired after: {}", error);
                } else if let Err(reset) = timed("RSET", self.limit(), self.client.rset()).await {
                    internal!(level = DEBUG, "RSET after a failed message failed: {}", reset);
                }
                Err(MailError::transmission(error))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        timed("QUIT", self.limit(), self.client.quit())
            .await
            .map_err(MailError::connection)?;
        Ok(())
    }
}
