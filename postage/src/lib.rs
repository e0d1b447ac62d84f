//! Assemble multipart mail and deliver it in batches.
//!
//! This crate gathers the public API of the `postage-*` crates and holds the
//! TOML mail format read by the `postage` binary.

pub mod mail_file;

pub use mail_file::{AttachmentFile, MailFile, MailFileError};
pub use postage_common::{
    MailError, Mailbox, Properties, Protocol, Result, TlsPolicy, TransportSettings, logging,
    parse_address_list,
};
pub use postage_delivery::{
    Connector, DeliveryAgent, DeliveryObserver, DeliveryReport, Envelope, FailurePolicy,
    MailOutcome, SmtpConnector, TracingObserver, Transport,
};
pub use postage_message::{
    ContentKind, ContentUnit, Disposition, Mail, MessageAssembler, Payload, WireMessage,
};
pub use postage_smtp as smtp;
