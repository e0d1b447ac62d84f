//! Mail delivery for postage.
//!
//! [`DeliveryAgent`] opens one transport per batch, assembles and sends each
//! mail in order, and closes the transport once. What happens on failure is
//! chosen per batch with [`FailurePolicy`]; every batch produces a
//! [`DeliveryReport`].
//!
//! ```no_run
//! use postage_common::Properties;
//! use postage_delivery::{DeliveryAgent, FailurePolicy};
//! use postage_message::Mail;
//!
//! # async fn example() -> postage_common::Result<()> {
//! let properties = Properties::new()
//!     .with("transport.smtp.host", "mail.example.com")
//!     .with("transport.smtp.port", "587");
//!
//! let mut mail = Mail::new();
//! mail.set_from("alice@example.com");
//! mail.add_to("bob@example.com")?;
//! mail.set_subject("Hello");
//! mail.set_text("Hi Bob");
//!
//! let report = DeliveryAgent::default()
//!     .send_batch(&properties, FailurePolicy::BestEffort, &[mail])
//!     .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

mod agent;
mod error;
mod observer;
mod policy;
mod report;
mod smtp;
mod transport;

pub use agent::DeliveryAgent;
pub use error::TransportError;
pub use observer::{DeliveryObserver, TracingObserver};
pub use policy::FailurePolicy;
pub use report::{DeliveryReport, MailOutcome};
pub use smtp::{SmtpConnector, SmtpTransport};
pub use transport::{Connector, Envelope, Transport};
