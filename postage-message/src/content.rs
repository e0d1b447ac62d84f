//! Content units: the labelled pieces of content a mail is built from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subtype of a plain textual unit.
pub const DEFAULT_TEXT_SUBTYPE: &str = "plain";
/// Subtype of an HTML unit. Fixed for [`ContentKind::Html`].
pub const HTML_SUBTYPE: &str = "html";
/// Content type of an attachment unless one is given.
pub const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";
/// Disposition of an attachment unless one is given.
pub const DEFAULT_DISPOSITION: Disposition = Disposition::Attachment;
/// Charset applied to a subject that has none.
pub const DEFAULT_SUBJECT_CHARSET: &str = "UTF-8";

/// The opaque payload of a content unit.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

/// Discriminates how a unit is turned into a body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    PlainText,
    Html,
    Attachment,
    Raw,
}

impl ContentKind {
    /// Textual kinds are written with a charset and a `text/*` type.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::PlainText | Self::Html)
    }
}

/// Whether an attachment is shown inline or offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    #[default]
    Attachment,
}

impl Disposition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled piece of content.
///
/// The label names an attachment's file; on a mail's primary unit it holds
/// the subject instead. Two units are equal when every field is equal, which
/// is what [`crate::Mail::detach`] matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentUnit {
    kind: ContentKind,
    content: Payload,
    content_type: String,
    label: Option<String>,
    label_charset: Option<String>,
    charset: Option<String>,
    subtype: String,
    disposition: Disposition,
}

impl ContentUnit {
    fn new(kind: ContentKind, content: Payload, content_type: String, subtype: &str) -> Self {
        Self {
            kind,
            content,
            content_type,
            label: None,
            label_charset: None,
            charset: None,
            subtype: subtype.to_string(),
            disposition: DEFAULT_DISPOSITION,
        }
    }

    /// A `text/plain` unit.
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self::new(
            ContentKind::PlainText,
            Payload::Text(text.into()),
            format!("text/{DEFAULT_TEXT_SUBTYPE}"),
            DEFAULT_TEXT_SUBTYPE,
        )
    }

    /// A `text/html` unit.
    pub fn html(text: impl Into<String>) -> Self {
        Self::new(
            ContentKind::Html,
            Payload::Text(text.into()),
            format!("text/{HTML_SUBTYPE}"),
            HTML_SUBTYPE,
        )
    }

    /// An attachment of type [`DEFAULT_ATTACHMENT_TYPE`] with the default
    /// disposition.
    pub fn attachment(content: impl Into<Payload>) -> Self {
        Self::new(
            ContentKind::Attachment,
            content.into(),
            DEFAULT_ATTACHMENT_TYPE.to_string(),
            "",
        )
    }

    /// Arbitrary typed content written as-is.
    pub fn raw(content: impl Into<Payload>, content_type: impl Into<String>) -> Self {
        Self::new(ContentKind::Raw, content.into(), content_type.into(), "")
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_label_charset(mut self, charset: impl Into<String>) -> Self {
        self.label_charset = Some(charset.into());
        self
    }

    /// Sets the charset textual content is encoded in.
    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Changes the subtype of a plain textual unit. HTML stays `html`, and
    /// non-textual units ignore it.
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        if self.kind == ContentKind::PlainText {
            self.subtype = subtype.into();
            self.content_type = format!("text/{}", self.subtype);
        }
        self
    }

    /// Overrides the content type of an attachment or raw unit. Textual
    /// units derive theirs from the subtype.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        if !self.kind.is_textual() {
            self.content_type = content_type.into();
        }
        self
    }

    #[must_use]
    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn set_label_charset(&mut self, charset: Option<String>) {
        self.label_charset = charset;
    }

    pub const fn set_disposition(&mut self, disposition: Disposition) {
        self.disposition = disposition;
    }

    #[must_use]
    pub const fn kind(&self) -> ContentKind {
        self.kind
    }

    #[must_use]
    pub const fn content(&self) -> &Payload {
        &self.content
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The text of a textual unit.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        if self.kind.is_textual() {
            self.content.as_text()
        } else {
            None
        }
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn label_charset(&self) -> Option<&str> {
        self.label_charset.as_deref()
    }

    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        self.disposition
    }

    /// Takes this unit's body while keeping `label` and `label_charset`.
    pub(crate) fn replace_body(&mut self, body: Self) {
        let label = self.label.take();
        let label_charset = self.label_charset.take();
        *self = Self {
            label,
            label_charset,
            ..body
        };
    }
}

impl Default for ContentUnit {
    fn default() -> Self {
        Self::plain_text(String::new())
    }
}
