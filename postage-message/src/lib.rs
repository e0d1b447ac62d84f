//! Mail descriptions and their assembly into multipart wire messages.
//!
//! A [`Mail`] is built up by the caller, then [`MessageAssembler`] turns it
//! into a [`WireMessage`] that can be rendered with
//! [`WireMessage::to_bytes`] and handed to a transport.

pub mod assembler;
pub mod content;
pub mod mail;
pub mod wire;

pub use assembler::{
    MessageAssembler, PartRole, apply_header_values, configure_mime_part, create_attachments,
    create_body_part,
};
pub use content::{
    ContentKind, ContentUnit, DEFAULT_ATTACHMENT_TYPE, DEFAULT_DISPOSITION,
    DEFAULT_SUBJECT_CHARSET, DEFAULT_TEXT_SUBTYPE, Disposition, HTML_SUBTYPE, Payload,
};
pub use mail::{AddressList, Mail};
pub use wire::{
    BodyPart, MimePart, Multipart, RecipientType, TransferEncoding, WireError, WireMessage,
};
