//! The assembled, wire-ready message and its RFC 5322 / MIME rendering.

use std::fmt::Write as _;

use base64::Engine;
use chrono::{DateTime, Utc};
use encoding_rs::Encoding;
use postage_common::{MailError, Mailbox, Result};
use thiserror::Error;

use crate::content::{Disposition, Payload};

/// Longest line written without folding or transfer encoding.
const MAX_7BIT_LINE: usize = 998;
/// Longest encoded-word, per RFC 2047.
const MAX_ENCODED_WORD: usize = 75;
/// Base64 body line width.
const BASE64_LINE: usize = 76;
/// Charset for header text that has none of its own.
const HEADER_CHARSET: &str = "UTF-8";

/// Headers owned by the body structure. Custom values for these are ignored.
const MIME_OWNED: [&str; 3] = ["MIME-Version", "Content-Type", "Content-Transfer-Encoding"];
/// Headers rendered from structured fields.
const STRUCTURED: [&str; 9] = [
    "Date",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "Subject",
];

/// Failures while encoding content for the wire.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Unknown charset '{0}'")]
    UnknownCharset(String),

    #[error("Text cannot be represented in charset '{0}'")]
    Unencodable(String),

    #[error("Invalid content type '{0}'")]
    InvalidContentType(String),
}

impl From<WireError> for MailError {
    fn from(value: WireError) -> Self {
        Self::assembly(value)
    }
}

/// The recipient class of an address header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
}

/// How a part body is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        }
    }
}

/// The part-level operations message assembly relies on.
pub trait MimePart {
    /// Sets textual content of type `text/<subtype>` encoded in `charset`.
    /// Without a charset, ASCII text is `us-ascii` and anything else UTF-8.
    ///
    /// # Errors
    ///
    /// Fails when the charset is unknown or cannot represent the text.
    fn set_text(&mut self, text: &str, charset: Option<&str>, subtype: &str) -> Result<()>;

    /// Sets arbitrary content with an explicit content type.
    ///
    /// # Errors
    ///
    /// Fails when the content type is not of the form `type/subtype`.
    fn set_content(&mut self, content: &Payload, content_type: &str) -> Result<()>;

    fn set_disposition(&mut self, disposition: Disposition);

    /// Names the part's file. Parts with a file name and no disposition are
    /// written as attachments.
    fn set_file_name(&mut self, name: &str, charset: Option<&str>);
}

/// One body part of a multipart message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    mime_type: String,
    params: Vec<(String, String)>,
    content: Payload,
    encoded: Vec<u8>,
    textual: bool,
    disposition: Option<Disposition>,
    file_name: Option<(String, Option<String>)>,
}

impl Default for BodyPart {
    fn default() -> Self {
        Self {
            mime_type: "text/plain".to_string(),
            params: Vec::new(),
            content: Payload::default(),
            encoded: Vec::new(),
            textual: true,
            disposition: None,
            file_name: None,
        }
    }
}

impl BodyPart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The bare `type/subtype`.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The full `Content-Type` value, parameters included.
    #[must_use]
    pub fn content_type(&self) -> String {
        let mut value = self.mime_type.clone();
        for (name, param) in &self.params {
            let _ = write!(value, "; {name}={}", quote_param(param));
        }
        value
    }

    /// The content as given, before any charset or transfer encoding.
    #[must_use]
    pub const fn content(&self) -> &Payload {
        &self.content
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }

    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    #[must_use]
    pub const fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_ref().map(|(name, _)| name.as_str())
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        if is_7bit_safe(&self.encoded) {
            TransferEncoding::SevenBit
        } else if self.textual {
            TransferEncoding::QuotedPrintable
        } else {
            TransferEncoding::Base64
        }
    }

    fn write_to(&self, out: &mut String) -> Result<()> {
        let mut content_type = self.content_type();
        if let Some((name, charset)) = &self.file_name {
            let encoded = encode_text(name, charset.as_deref())?;
            let _ = write!(content_type, "; name={}", quote_param(&encoded));
        }
        write_header(out, "Content-Type", &content_type);

        let encoding = self.transfer_encoding();
        write_header(out, "Content-Transfer-Encoding", encoding.as_str());

        if self.disposition.is_some() || self.file_name.is_some() {
            let mut value = self
                .disposition
                .unwrap_or(Disposition::Attachment)
                .as_str()
                .to_string();
            if let Some((name, charset)) = &self.file_name {
                let encoded = encode_text(name, charset.as_deref())?;
                let _ = write!(value, "; filename={}", quote_param(&encoded));
            }
            write_header(out, "Content-Disposition", &value);
        }

        out.push_str("\r\n");

        match encoding {
            TransferEncoding::SevenBit => {
                out.push_str(&String::from_utf8_lossy(&self.encoded));
            }
            TransferEncoding::QuotedPrintable => {
                out.push_str(&quoted_printable::encode_to_str(&self.encoded));
            }
            TransferEncoding::Base64 => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&self.encoded);
                push_wrapped(out, &encoded, BASE64_LINE);
            }
        }

        Ok(())
    }
}

impl MimePart for BodyPart {
    fn set_text(&mut self, text: &str, charset: Option<&str>, subtype: &str) -> Result<()> {
        let label = charset
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(if text.is_ascii() { "us-ascii" } else { "UTF-8" });
        let (encoded, label) = encode_in_charset(&normalize_line_endings(text), label)?;

        self.mime_type = format!("text/{}", subtype.trim().to_ascii_lowercase());
        self.params = vec![("charset".to_string(), label)];
        self.content = Payload::Text(text.to_string());
        self.encoded = encoded;
        self.textual = true;
        Ok(())
    }

    fn set_content(&mut self, content: &Payload, content_type: &str) -> Result<()> {
        let (mime_type, params) = parse_content_type(content_type)?;

        self.textual = false;
        self.encoded = match content {
            Payload::Text(text) if is_7bit_safe(text.as_bytes()) => {
                normalize_line_endings(text).into_bytes()
            }
            other => other.as_bytes().to_vec(),
        };
        self.mime_type = mime_type;
        self.params = params;
        let needs_charset = content.as_text().is_some_and(|text| !text.is_ascii())
            && self.mime_type.starts_with("text/")
            && self.param("charset").is_none();
        if needs_charset {
            self.params
                .push(("charset".to_string(), HEADER_CHARSET.to_string()));
        }
        self.content = content.clone();
        Ok(())
    }

    fn set_disposition(&mut self, disposition: Disposition) {
        self.disposition = Some(disposition);
    }

    fn set_file_name(&mut self, name: &str, charset: Option<&str>) {
        self.file_name = Some((name.to_string(), charset.map(ToString::to_string)));
    }
}

/// An ordered container of body parts, always written as `multipart/mixed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    boundary: String,
    parts: Vec<BodyPart>,
}

impl Default for Multipart {
    fn default() -> Self {
        Self {
            boundary: format!("----=_Part_{}", ulid::Ulid::new()),
            parts: Vec::new(),
        }
    }
}

impl Multipart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: BodyPart) {
        self.parts.push(part);
    }

    /// Inserts `part` at `index`, shifting later parts along. An index past
    /// the end appends.
    pub fn insert_part(&mut self, index: usize, part: BodyPart) {
        let index = index.min(self.parts.len());
        self.parts.insert(index, part);
    }

    #[must_use]
    pub fn parts(&self) -> &[BodyPart] {
        &self.parts
    }

    #[must_use]
    pub fn part(&self, index: usize) -> Option<&BodyPart> {
        self.parts.get(index)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn write_to(&self, out: &mut String) -> Result<()> {
        for part in &self.parts {
            let _ = write!(out, "--{}\r\n", self.boundary);
            part.write_to(out)?;
            out.push_str("\r\n");
        }
        let _ = write!(out, "--{}--\r\n", self.boundary);
        Ok(())
    }
}

/// An assembled message ready for transmission.
///
/// `Bcc` recipients are kept for the envelope but never written into the
/// rendered headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    message_id: String,
    sent_date: Option<DateTime<Utc>>,
    from: Option<Mailbox>,
    sender: Option<Mailbox>,
    reply_to: Vec<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    subject: Option<(String, String)>,
    headers: Vec<(String, String)>,
    body: Multipart,
}

impl WireMessage {
    /// Creates an empty message whose `Message-ID` is unique within `host`.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            message_id: format!("<{}@{}>", ulid::Ulid::new(), host),
            sent_date: None,
            from: None,
            sender: None,
            reply_to: Vec::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: None,
            headers: Vec::new(),
            body: Multipart::new(),
        }
    }

    #[must_use]
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn set_from(&mut self, from: Mailbox) {
        self.from = Some(from);
    }

    #[must_use]
    pub const fn from(&self) -> Option<&Mailbox> {
        self.from.as_ref()
    }

    pub fn set_sender(&mut self, sender: Mailbox) {
        self.sender = Some(sender);
    }

    #[must_use]
    pub const fn sender(&self) -> Option<&Mailbox> {
        self.sender.as_ref()
    }

    pub fn set_reply_to(&mut self, reply_to: Vec<Mailbox>) {
        self.reply_to = reply_to;
    }

    #[must_use]
    pub fn reply_to(&self) -> &[Mailbox] {
        &self.reply_to
    }

    pub fn set_recipients(&mut self, kind: RecipientType, recipients: Vec<Mailbox>) {
        match kind {
            RecipientType::To => self.to = recipients,
            RecipientType::Cc => self.cc = recipients,
            RecipientType::Bcc => self.bcc = recipients,
        }
    }

    #[must_use]
    pub fn recipients(&self, kind: RecipientType) -> &[Mailbox] {
        match kind {
            RecipientType::To => &self.to,
            RecipientType::Cc => &self.cc,
            RecipientType::Bcc => &self.bcc,
        }
    }

    /// `To`, then `Cc`, then `Bcc` recipients.
    pub fn all_recipients(&self) -> impl Iterator<Item = &Mailbox> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    pub fn set_subject(&mut self, subject: impl Into<String>, charset: impl Into<String>) {
        self.subject = Some((subject.into(), charset.into()));
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_ref().map(|(s, _)| s.as_str())
    }

    #[must_use]
    pub fn subject_charset(&self) -> Option<&str> {
        self.subject.as_ref().map(|(_, c)| c.as_str())
    }

    /// Sets a header, replacing any existing value whose name matches
    /// ignoring case. A header named like a structured field (`From`,
    /// `Subject`, ...) overrides that field when rendered.
    pub fn set_header(&mut self, name: &str, value: &str) {
        let value = sanitize_header_value(value);
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name.trim().to_string(), value));
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn set_sent_date(&mut self, date: DateTime<Utc>) {
        self.sent_date = Some(date);
    }

    #[must_use]
    pub const fn sent_date(&self) -> Option<DateTime<Utc>> {
        self.sent_date
    }

    pub fn set_content(&mut self, body: Multipart) {
        self.body = body;
    }

    #[must_use]
    pub const fn content(&self) -> &Multipart {
        &self.body
    }

    /// Renders the message with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Fails when a subject, display name or file name cannot be encoded in
    /// its charset.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = String::new();

        if let Some(date) = self.sent_date {
            self.write_structured(&mut out, "Date", Some(date.to_rfc2822()));
        }
        let from = self.from.as_ref().map(render_mailbox).transpose()?;
        self.write_structured(&mut out, "From", from);
        let sender = self.sender.as_ref().map(render_mailbox).transpose()?;
        self.write_structured(&mut out, "Sender", sender);
        self.write_structured(&mut out, "Reply-To", render_list(&self.reply_to)?);
        self.write_structured(&mut out, "To", render_list(&self.to)?);
        self.write_structured(&mut out, "Cc", render_list(&self.cc)?);
        self.write_structured(&mut out, "Message-ID", Some(self.message_id.clone()));
        let subject = self
            .subject
            .as_ref()
            .map(|(subject, charset)| encode_text(subject, Some(charset)))
            .transpose()?;
        self.write_structured(&mut out, "Subject", subject);

        for (name, value) in &self.headers {
            let owned = MIME_OWNED
                .iter()
                .chain(STRUCTURED.iter())
                .any(|h| h.eq_ignore_ascii_case(name));
            if !owned {
                write_header(&mut out, name, &encode_text(value, None)?);
            }
        }

        write_header(&mut out, "MIME-Version", "1.0");
        write_header(
            &mut out,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{}\"", self.body.boundary()),
        );
        out.push_str("\r\n");

        self.body.write_to(&mut out)?;

        Ok(out.into_bytes())
    }

    fn write_structured(&self, out: &mut String, name: &str, value: Option<String>) {
        let custom = (name != "Bcc")
            .then(|| self.header(name))
            .flatten()
            .map(ToString::to_string);
        if let Some(value) = custom.or(value) {
            write_header(out, name, &value);
        }
    }
}

fn write_header(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}: {value}\r\n");
}

fn sanitize_header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_mailbox(mailbox: &Mailbox) -> Result<String> {
    match &mailbox.display_name {
        Some(name) if !name.is_ascii() => Ok(format!(
            "{} <{}>",
            encode_text(name, Some(HEADER_CHARSET))?,
            mailbox.address()
        )),
        _ => Ok(mailbox.to_string()),
    }
}

/// Joins mailboxes, folding before any address that would push the line
/// past 78 characters.
fn render_list(mailboxes: &[Mailbox]) -> Result<Option<String>> {
    if mailboxes.is_empty() {
        return Ok(None);
    }

    let mut value = String::new();
    let mut line = 0;
    for (index, mailbox) in mailboxes.iter().enumerate() {
        let rendered = render_mailbox(mailbox)?;
        if index > 0 {
            if line + rendered.len() + 2 > 72 {
                value.push_str(",\r\n ");
                line = 1;
            } else {
                value.push_str(", ");
                line += 2;
            }
        }
        line += rendered.len();
        value.push_str(&rendered);
    }

    Ok(Some(value))
}

fn quote_param(value: &str) -> String {
    let token = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b));
    if token {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn parse_content_type(content_type: &str) -> Result<(String, Vec<(String, String)>)> {
    let mut pieces = content_type.split(';');
    let mime_type = pieces.next().unwrap_or_default().trim().to_ascii_lowercase();

    let valid = mime_type
        .split_once('/')
        .is_some_and(|(t, s)| !t.is_empty() && !s.is_empty() && !s.contains('/'));
    if !valid {
        return Err(WireError::InvalidContentType(content_type.to_string()).into());
    }

    let params = pieces
        .filter_map(|piece| {
            let (name, value) = piece.split_once('=')?;
            let value = value.trim().trim_matches('"');
            Some((name.trim().to_ascii_lowercase(), value.to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect();

    Ok((mime_type, params))
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', "\r\n")
}

/// ASCII without NULs, bare CRs or bare LFs, and no line over 998 octets.
fn is_7bit_safe(bytes: &[u8]) -> bool {
    if !bytes.is_ascii() || bytes.contains(&0) {
        return false;
    }

    let mut line = 0;
    let mut previous = 0u8;
    for &b in bytes {
        match b {
            b'\n' if previous != b'\r' => return false,
            b'\n' => line = 0,
            b'\r' => {}
            _ if previous == b'\r' => return false,
            _ => line += 1,
        }
        if line > MAX_7BIT_LINE {
            return false;
        }
        previous = b;
    }

    previous != b'\r'
}

fn lookup_charset(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| WireError::UnknownCharset(label.to_string()).into())
}

/// Encodes `text` in the charset named by `label`, returning the bytes and
/// the label to declare. Charsets `encoding_rs` only decodes (UTF-16) are
/// written as UTF-8 and declared as such.
fn encode_in_charset(text: &str, label: &str) -> Result<(Vec<u8>, String)> {
    let encoding = lookup_charset(label)?;
    let output = encoding.output_encoding();
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable || !fits_declared(label, &bytes) {
        return Err(WireError::Unencodable(label.to_string()).into());
    }

    let declared = if output == encoding {
        label.trim().to_string()
    } else {
        output.name().to_string()
    };
    Ok((bytes.into_owned(), declared))
}

/// `encoding_rs` resolves the US-ASCII and ISO-8859-1 labels to
/// windows-1252. Bytes outside the charset actually named are refused.
fn fits_declared(label: &str, bytes: &[u8]) -> bool {
    match label.trim().to_ascii_lowercase().as_str() {
        "us-ascii" | "ascii" | "ansi_x3.4-1968" | "us" | "iso646-us" => bytes.is_ascii(),
        "iso-8859-1" | "iso8859-1" | "iso88591" | "iso_8859-1" | "iso_8859-1:1987" | "latin1"
        | "l1" | "iso-ir-100" | "cp819" | "ibm819" | "csisolatin1" => {
            !bytes.iter().any(|b| (0x80..=0x9f).contains(b))
        }
        _ => true,
    }
}

/// Returns `text` unchanged when it is plain printable ASCII, otherwise as
/// RFC 2047 B encoded-words in `charset` (UTF-8 when absent).
fn encode_text(text: &str, charset: Option<&str>) -> Result<String> {
    let plain = text.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) && !text.contains("=?");
    if plain {
        return Ok(text.to_string());
    }

    let label = charset
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(HEADER_CHARSET);
    let encoding = lookup_charset(label)?;
    let declared = if encoding.output_encoding() == encoding {
        label
    } else {
        encoding.output_encoding().name()
    };

    // Raw octets per word: each 3 octets become 4 base64 characters.
    let overhead = declared.len() + "=??B??=".len();
    let per_word = MAX_ENCODED_WORD.saturating_sub(overhead) / 4 * 3;
    if per_word == 0 {
        return Err(WireError::UnknownCharset(label.to_string()).into());
    }

    let mut words = Vec::new();
    let mut chunk: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        let (bytes, _, unmappable) = encoding.encode(ch.encode_utf8(&mut buf));
        if unmappable || !fits_declared(label, &bytes) {
            return Err(WireError::Unencodable(label.to_string()).into());
        }
        if !chunk.is_empty() && chunk.len() + bytes.len() > per_word {
            words.push(encoded_word(declared, &chunk));
            chunk.clear();
        }
        chunk.extend_from_slice(&bytes);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(declared, &chunk));
    }

    Ok(words.join("\r\n "))
}

fn encoded_word(charset: &str, bytes: &[u8]) -> String {
    format!(
        "=?{charset}?B?{}?=",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn push_wrapped(out: &mut String, text: &str, width: usize) {
    let mut rest = text;
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(width));
        out.push_str(line);
        out.push_str("\r\n");
        rest = tail;
    }
}
