//! SMTP submission client.
//!
//! Supports plain TCP, implicit TLS (SMTPS) and STARTTLS upgrades,
//! `AUTH PLAIN` and `AUTH LOGIN`, and dot-stuffed `DATA` transfer.
//!
//! # Examples
//!
//! ```no_run
//! use postage_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("localhost:2525", "localhost".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("sender@example.com", None).await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! let reply = client.send_data(b"Subject: Test\r\n\r\nHello World").await?;
//! assert!(reply.is_success());
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod capabilities;
mod error;
mod response;
mod smtp_client;

pub use auth::{AuthMechanism, login_response, plain_response};
pub use capabilities::Capabilities;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::{SmtpClient, dot_stuff};
