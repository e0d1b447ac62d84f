//! TOML descriptions of a single mail, as read by the `postage` binary.
//!
//! ```toml
//! from = "Alice <alice@example.com>"
//! to = ["bob@example.com"]
//! subject = "Quarterly report"
//! text = "See attached."
//!
//! [headers]
//! X-Mailer = "postage"
//!
//! [[attachments]]
//! path = "report.csv"
//! content_type = "text/csv"
//! ```

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use postage_common::MailError;
use postage_message::{ContentUnit, Disposition, Mail};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailFileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mail description: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Attachment {index}: {reason}")]
    Attachment { index: usize, reason: String },

    #[error("Only one of `text` and `html` may be given")]
    ConflictingBody,

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// One attachment: either a file, or inline text.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AttachmentFile {
    /// Relative paths are resolved against the mail file's directory.
    pub path: Option<PathBuf>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    /// File name shown to the recipient. Defaults to the file name of `path`.
    pub label: Option<String>,
    pub disposition: Option<Disposition>,
}

#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MailFile {
    pub from: Option<String>,
    pub sender: Option<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub subject_charset: Option<String>,
    pub text: Option<String>,
    pub html: Option<String>,
    /// Charset of `text` or `html`.
    pub charset: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentFile>,
}

impl MailFile {
    /// # Errors
    ///
    /// Fails when `text` is not a valid mail description.
    pub fn from_toml_str(text: &str) -> Result<Self, MailFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a mail description and builds the mail, resolving attachment
    /// paths against the file's directory.
    ///
    /// # Errors
    ///
    /// Fails when the file or an attachment cannot be read, or the
    /// description is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Mail, MailFileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| MailFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text)?.into_mail(base)
    }

    /// Builds the mail this file describes.
    ///
    /// # Errors
    ///
    /// Fails on blank addresses or header names, unreadable or ambiguous
    /// attachments, or when both `text` and `html` are given.
    pub fn into_mail(self, base: &Path) -> Result<Mail, MailFileError> {
        let mut mail = Mail::new();

        if let Some(from) = &self.from {
            mail.set_from(from);
        }
        if let Some(sender) = &self.sender {
            mail.set_sender(sender);
        }
        for address in &self.reply_to {
            mail.add_reply_to(address)?;
        }
        for address in &self.to {
            mail.add_to(address)?;
        }
        for address in &self.cc {
            mail.add_cc(address)?;
        }
        for address in &self.bcc {
            mail.add_bcc(address)?;
        }

        match (self.subject, self.subject_charset) {
            (Some(subject), Some(charset)) => mail.set_subject_with_charset(subject, charset),
            (Some(subject), None) => mail.set_subject(subject),
            (None, _) => {}
        }

        match (self.text, self.html, self.charset) {
            (Some(_), Some(_), _) => return Err(MailFileError::ConflictingBody),
            (Some(text), None, Some(charset)) => mail.set_text_with_charset(text, charset),
            (Some(text), None, None) => mail.set_text(text),
            (None, Some(html), Some(charset)) => mail.set_html_with_charset(html, charset),
            (None, Some(html), None) => mail.set_html(html),
            (None, None, _) => {}
        }

        for (name, value) in &self.headers {
            mail.set_header(name, value.as_str())?;
        }

        for (index, attachment) in self.attachments.into_iter().enumerate() {
            mail.attach(attachment.into_unit(index, base)?);
        }

        Ok(mail)
    }
}

impl AttachmentFile {
    fn into_unit(self, index: usize, base: &Path) -> Result<ContentUnit, MailFileError> {
        let fail = |reason: String| MailFileError::Attachment { index, reason };

        let (mut unit, default_label) = match (self.path, self.content) {
            (Some(path), None) => {
                let resolved = base.join(&path);
                let bytes = fs::read(&resolved)
                    .map_err(|e| fail(format!("{}: {e}", resolved.display())))?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
                (ContentUnit::attachment(bytes), name)
            }
            (None, Some(content)) => (ContentUnit::attachment(content), None),
            (Some(_), Some(_)) => {
                return Err(fail("only one of `path` and `content` may be given".to_string()));
            }
            (None, None) => return Err(fail("one of `path` or `content` is required".to_string())),
        };

        if let Some(content_type) = self.content_type {
            unit = unit.with_content_type(content_type);
        }
        if let Some(label) = self.label.or(default_label) {
            unit = unit.with_label(label);
        }
        if let Some(disposition) = self.disposition {
            unit = unit.with_disposition(disposition);
        }

        Ok(unit)
    }
}
