//! Turns a [`Mail`] into a [`WireMessage`].
//!
//! The body is always a `multipart/mixed` container: the mail's primary
//! content is part 0 and attachments follow in the order they were attached.
//! Assembly never mutates the mail, and a failure anywhere yields no message.

use postage_common::{
    MailError, Mailbox, Properties, Result, check_argument, internal, is_blank, parse_address_list,
};

use crate::{
    content::{ContentKind, ContentUnit, DEFAULT_SUBJECT_CHARSET},
    mail::Mail,
    wire::{BodyPart, MimePart, Multipart, RecipientType, WireMessage},
};

/// Property naming the domain used in generated `Message-ID`s.
pub const MESSAGE_HOST_KEY: &str = "message.host";
/// Fallback `Message-ID` domain.
pub const DEFAULT_MESSAGE_HOST: &str = "localhost";

/// Which role a content unit plays in the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartRole {
    /// The mail's own content. Its label is the subject, never a file name.
    Primary,
    Attachment,
}

/// Builds wire messages for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAssembler {
    host: String,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_HOST)
    }
}

impl MessageAssembler {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    #[must_use]
    pub fn from_properties(properties: &Properties) -> Self {
        Self::new(properties.get_or(MESSAGE_HOST_KEY, DEFAULT_MESSAGE_HOST).trim())
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Validates the mail and builds a message carrying its addresses and
    /// subject.
    ///
    /// Only the first `Sender` and `From` mailbox is kept when a field holds
    /// several. The subject charset defaults to
    /// [`DEFAULT_SUBJECT_CHARSET`].
    ///
    /// # Errors
    ///
    /// A precondition error when `from` or the subject is blank, or when
    /// `to`, `cc` and `bcc` are all empty; an address syntax error when any
    /// field fails to parse.
    pub fn build_base_message(&self, mail: &Mail) -> Result<WireMessage> {
        check_argument(!is_blank(mail.from()), "from")?;
        check_argument(
            mail.to().is_some() || mail.cc().is_some() || mail.bcc().is_some(),
            "No destination found (to, cc or bcc)",
        )?;
        check_argument(!is_blank(mail.subject()), "subject")?;

        let sender = parse_field(mail.sender())?.into_iter().next();
        let from = parse_field(mail.from())?
            .into_iter()
            .next()
            .ok_or_else(|| MailError::precondition("from"))?;
        let reply_to = parse_field(mail.reply_to().as_deref())?;
        let to = parse_field(mail.to().as_deref())?;
        let cc = parse_field(mail.cc().as_deref())?;
        let bcc = parse_field(mail.bcc().as_deref())?;

        let charset = mail
            .subject_charset()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_SUBJECT_CHARSET);

        let mut message = WireMessage::new(&self.host);
        message.set_from(from);
        message.set_subject(mail.subject().unwrap_or_default(), charset);

        if let Some(sender) = sender {
            message.set_sender(sender);
        }
        if !reply_to.is_empty() {
            message.set_reply_to(reply_to);
        }
        for (kind, list) in [
            (RecipientType::To, to),
            (RecipientType::Cc, cc),
            (RecipientType::Bcc, bcc),
        ] {
            if !list.is_empty() {
                message.set_recipients(kind, list);
            }
        }

        Ok(message)
    }

    /// Builds the complete message: base fields, custom headers, then the
    /// multipart body.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::build_base_message`], or an assembly error
    /// when a part cannot be encoded.
    pub fn create_message(&self, mail: &Mail) -> Result<WireMessage> {
        let mut message = self.build_base_message(mail)?;
        apply_header_values(&mut message, mail.headers());

        let mut multipart = create_attachments(mail.attachments())?;
        multipart.insert_part(0, create_body_part(mail.body(), PartRole::Primary)?);

        internal!(
            level = DEBUG,
            "Assembled {} with {} part(s)",
            message.message_id(),
            multipart.count()
        );

        message.set_content(multipart);
        Ok(message)
    }
}

fn parse_field(value: Option<&str>) -> Result<Vec<Mailbox>> {
    match value {
        Some(input) if !input.trim().is_empty() => {
            parse_address_list(input).map_err(|source| MailError::AddressSyntax {
                input: input.to_string(),
                source,
            })
        }
        _ => Ok(Vec::new()),
    }
}

/// Copies every non-blank header onto `message`. Later entries for the same
/// name overwrite earlier ones; blank values are skipped.
pub fn apply_header_values<'a, I>(message: &mut WireMessage, headers: I)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    for (name, value) in headers {
        if !is_blank(Some(value)) && !is_blank(Some(name)) {
            message.set_header(name, value);
        }
    }
}

/// One part per attachment, in order.
///
/// # Errors
///
/// Fails when any attachment cannot be encoded.
pub fn create_attachments(attachments: &[ContentUnit]) -> Result<Multipart> {
    let mut multipart = Multipart::new();
    for attachment in attachments {
        multipart.add_part(create_body_part(attachment, PartRole::Attachment)?);
    }
    Ok(multipart)
}

/// # Errors
///
/// Fails when the unit cannot be encoded.
pub fn create_body_part(unit: &ContentUnit, role: PartRole) -> Result<BodyPart> {
    let mut part = BodyPart::new();
    configure_mime_part(unit, role, &mut part)?;
    Ok(part)
}

/// Writes `unit` into `part`.
///
/// Textual units set text, charset and subtype; everything else sets raw
/// content and its type. Attachments also set their disposition, and
/// non-primary units with a label set it as the file name.
///
/// # Errors
///
/// Fails when the part rejects the content.
pub fn configure_mime_part<P>(unit: &ContentUnit, role: PartRole, part: &mut P) -> Result<()>
where
    P: MimePart + ?Sized,
{
    match unit.kind() {
        ContentKind::PlainText | ContentKind::Html => {
            part.set_text(
                unit.content().as_text().unwrap_or_default(),
                unit.charset(),
                unit.subtype(),
            )?;
        }
        ContentKind::Attachment | ContentKind::Raw => {
            part.set_content(unit.content(), unit.content_type())?;
        }
    }

    if unit.kind() == ContentKind::Attachment {
        part.set_disposition(unit.disposition());
    }

    if role != PartRole::Primary {
        if let Some(label) = unit.label().filter(|l| !l.trim().is_empty()) {
            part.set_file_name(label, unit.label_charset());
        }
    }

    Ok(())
}
