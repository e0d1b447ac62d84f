//! Scriptable SMTP server for delivery tests.
#![allow(dead_code)] // Not every test uses every knob
//!
//! Records every command it receives, answers with configurable replies,
//! and can refuse individual recipients or individual messages of a session.
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_rejected_recipient("nobody@example.com")
//!     .with_data_end_responses(vec![(250, "OK"), (554, "Rejected")])
//!     .build()
//!     .await?;
//!
//! // Deliver to server.addr(), then inspect server.commands().await
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// A command as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// Everything after `MAIL `.
    MailFrom(String),
    /// Everything after `RCPT `.
    RcptTo(String),
    Data,
    /// The message as transmitted, with dot-stuffing undone.
    MessageContent(Vec<u8>),
    /// Every line of the exchange, starting with the `AUTH` command.
    Auth(Vec<String>),
    Rset,
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    lines: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.lines.len().saturating_sub(1);

        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{line}\r\n", self.code);
        }

        response.into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: EhloResponse,
    helo_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rejected_recipients: Vec<String>,
    data_response: SmtpResponse,
    /// Reply to the Nth message of a session; later messages get the default.
    data_end_responses: Vec<SmtpResponse>,
    data_end_response: SmtpResponse,
    /// Held back before replying to the first message of a session.
    first_data_end_delay: Option<Duration>,
    auth_response: SmtpResponse,
    quit_response: SmtpResponse,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_response: EhloResponse {
                code: 250,
                lines: vec!["localhost".to_string(), "SIZE 100000".to_string()],
            },
            helo_response: SmtpResponse::new(250, "Hello"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rejected_recipients: Vec::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_responses: Vec::new(),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            first_data_end_delay: None,
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            quit_response: SmtpResponse::new(221, "Bye"),
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// How many received commands satisfy `predicate`.
    pub async fn count(&self, predicate: impl Fn(&SmtpCommand) -> bool) -> usize {
        self.commands_received
            .read()
            .await
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Every message body received, in order.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands_received
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                SmtpCommand::MessageContent(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> std::io::Result<usize>
    where
        R: AsyncBufReadExt + Unpin,
    {
        line.clear();
        reader.read_until(b'\n', line).await
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut messages = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            let read = timeout(
                Duration::from_secs(10),
                Self::read_line(&mut reader, &mut line),
            )
            .await;
            let Ok(read) = read else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let text = String::from_utf8_lossy(&line).into_owned();
            let cmd_line = text.trim();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, command) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (
                    config.ehlo_response.to_bytes(),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => {
                    let rejected = config
                        .rejected_recipients
                        .iter()
                        .any(|r| argument.contains(&format!("<{r}>")));
                    let response = if rejected {
                        SmtpResponse::new(550, "No such user")
                    } else {
                        config.rcpt_to_response.clone()
                    };
                    (response.to_bytes(), SmtpCommand::RcptTo(argument.to_string()))
                }
                "RSET" => (
                    SmtpResponse::new(250, "OK").to_bytes(),
                    SmtpCommand::Rset,
                ),
                "STARTTLS" => (
                    SmtpResponse::new(502, "Command not implemented").to_bytes(),
                    SmtpCommand::StartTls,
                ),
                "AUTH" => {
                    let mut exchange = vec![cmd_line.to_string()];
                    if argument.eq_ignore_ascii_case("LOGIN") {
                        for prompt in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                            writer
                                .write_all(format!("334 {prompt}\r\n").as_bytes())
                                .await?;
                            writer.flush().await?;
                            Self::read_line(&mut reader, &mut line).await?;
                            exchange.push(String::from_utf8_lossy(&line).trim().to_string());
                        }
                    }
                    (config.auth_response.to_bytes(), SmtpCommand::Auth(exchange))
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit_response.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            commands.write().await.push(command);
            writer.write_all(&response).await?;
            writer.flush().await?;

            if !is_data || config.data_response.code != 354 {
                continue;
            }

            let mut content = Vec::new();
            loop {
                if Self::read_line(&mut reader, &mut line).await? == 0 {
                    return Ok(());
                }
                if line == b".\r\n" || line == b".\n" {
                    break;
                }
                let unstuffed = line.strip_prefix(b".").unwrap_or(&line[..]);
                content.extend_from_slice(unstuffed);
            }

            commands
                .write()
                .await
                .push(SmtpCommand::MessageContent(content));

            let reply = config
                .data_end_responses
                .get(messages)
                .unwrap_or(&config.data_end_response);
            if messages == 0 {
                if let Some(delay) = config.first_data_end_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            messages += 1;
            writer.write_all(&reply.to_bytes()).await?;
            writer.flush().await?;
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Replace the EHLO reply; the first line is the greeting line.
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, lines: &[&str]) -> Self {
        self.config.ehlo_response = EhloResponse {
            code,
            lines: lines.iter().map(ToString::to_string).collect(),
        };
        self
    }

    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Answer `RCPT TO:<address>` with 550.
    #[must_use]
    pub fn with_rejected_recipient(mut self, address: impl Into<String>) -> Self {
        self.config.rejected_recipients.push(address.into());
        self
    }

    /// Replies to the end of each message of a session, in order.
    #[must_use]
    pub fn with_data_end_responses(mut self, responses: Vec<(u16, &str)>) -> Self {
        self.config.data_end_responses = responses
            .into_iter()
            .map(|(code, message)| SmtpResponse::new(code, message))
            .collect();
        self
    }

    /// Stall the reply to the first message of a session by `delay`.
    #[must_use]
    pub fn with_first_data_end_delay(mut self, delay: Duration) -> Self {
        self.config.first_data_end_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    /// Bind to a random local port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind.
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !shutdown_clone.load(Ordering::Relaxed) {
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accepted {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                        {
                            eprintln!("Mock server client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
