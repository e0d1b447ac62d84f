//! The caller-built description of one message.

use postage_common::{Result, check_argument, is_blank};

use crate::content::{ContentUnit, Payload};

/// An ordered list of address tokens, joined with commas only when read back
/// as a single field value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AddressList(Vec<String>);

impl AddressList {
    fn push(&mut self, address: &str) -> Result<()> {
        let tokens = split_tokens(address);
        check_argument(!tokens.is_empty(), "address")?;
        self.0.extend(tokens);
        Ok(())
    }

    fn replace(&mut self, value: &str) {
        self.0 = split_tokens(value);
    }

    /// The comma-joined field value, `None` while empty.
    #[must_use]
    pub fn joined(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.join(","))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A mail under construction.
///
/// A `Mail` is itself the primary content unit of the message it describes:
/// its body is plain text, HTML or raw content, and the body's label is the
/// subject. Attachments are kept in insertion order.
///
/// ```
/// use postage_message::{ContentUnit, Mail};
///
/// # fn main() -> postage_common::Result<()> {
/// let mut mail = Mail::new();
/// mail.set_from("from@email.com");
/// mail.add_to("to@email.com")?.add_to("to2@email.com")?;
/// mail.set_subject("Teste");
/// mail.set_text("Mail content body.");
/// mail.attach(
///     ContentUnit::attachment("<data/>")
///         .with_content_type("application/xml")
///         .with_label("data.xml"),
/// );
///
/// assert_eq!(mail.to().as_deref(), Some("to@email.com,to2@email.com"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mail {
    body: ContentUnit,
    headers: Vec<(String, String)>,
    sender: Option<String>,
    from: Option<String>,
    reply_to: AddressList,
    to: AddressList,
    cc: AddressList,
    bcc: AddressList,
    attachments: Vec<ContentUnit>,
}

/// Splits on commas outside quoted strings, dropping blank pieces.
fn split_tokens(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                tokens.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&value[start..]);

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn non_blank(value: &str) -> Option<String> {
    (!is_blank(Some(value))).then(|| value.trim().to_string())
}

impl Mail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `Reply-To` address.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when `address` is blank.
    pub fn add_reply_to(&mut self, address: &str) -> Result<&mut Self> {
        self.reply_to.push(address)?;
        Ok(self)
    }

    /// Appends a `To` address.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when `address` is blank.
    pub fn add_to(&mut self, address: &str) -> Result<&mut Self> {
        self.to.push(address)?;
        Ok(self)
    }

    /// Appends a `Cc` address.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when `address` is blank.
    pub fn add_cc(&mut self, address: &str) -> Result<&mut Self> {
        self.cc.push(address)?;
        Ok(self)
    }

    /// Appends a `Bcc` address.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when `address` is blank.
    pub fn add_bcc(&mut self, address: &str) -> Result<&mut Self> {
        self.bcc.push(address)?;
        Ok(self)
    }

    pub fn set_reply_to(&mut self, value: &str) {
        self.reply_to.replace(value);
    }

    pub fn set_to(&mut self, value: &str) {
        self.to.replace(value);
    }

    pub fn set_cc(&mut self, value: &str) {
        self.cc.replace(value);
    }

    pub fn set_bcc(&mut self, value: &str) {
        self.bcc.replace(value);
    }

    #[must_use]
    pub fn reply_to(&self) -> Option<String> {
        self.reply_to.joined()
    }

    #[must_use]
    pub fn to(&self) -> Option<String> {
        self.to.joined()
    }

    #[must_use]
    pub fn cc(&self) -> Option<String> {
        self.cc.joined()
    }

    #[must_use]
    pub fn bcc(&self) -> Option<String> {
        self.bcc.joined()
    }

    #[must_use]
    pub const fn reply_to_list(&self) -> &AddressList {
        &self.reply_to
    }

    #[must_use]
    pub const fn to_list(&self) -> &AddressList {
        &self.to
    }

    #[must_use]
    pub const fn cc_list(&self) -> &AddressList {
        &self.cc
    }

    #[must_use]
    pub const fn bcc_list(&self) -> &AddressList {
        &self.bcc
    }

    pub fn set_sender(&mut self, sender: &str) {
        self.sender = non_blank(sender);
    }

    pub fn set_from(&mut self, from: &str) {
        self.from = non_blank(from);
    }

    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.body.set_label(Some(subject.into()));
    }

    pub fn set_subject_with_charset(
        &mut self,
        subject: impl Into<String>,
        charset: impl Into<String>,
    ) {
        self.body.set_label(Some(subject.into()));
        self.body.set_label_charset(Some(charset.into()));
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.body.label()
    }

    #[must_use]
    pub fn subject_charset(&self) -> Option<&str> {
        self.body.label_charset()
    }

    /// Makes the primary content plain text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.body.replace_body(ContentUnit::plain_text(text));
    }

    pub fn set_text_with_charset(&mut self, text: impl Into<String>, charset: impl Into<String>) {
        self.body
            .replace_body(ContentUnit::plain_text(text).with_charset(charset));
    }

    /// Makes the primary content HTML.
    pub fn set_html(&mut self, html: impl Into<String>) {
        self.body.replace_body(ContentUnit::html(html));
    }

    pub fn set_html_with_charset(&mut self, html: impl Into<String>, charset: impl Into<String>) {
        self.body
            .replace_body(ContentUnit::html(html).with_charset(charset));
    }

    /// Makes the primary content arbitrary typed content.
    pub fn set_body(&mut self, content: impl Into<Payload>, content_type: impl Into<String>) {
        self.body
            .replace_body(ContentUnit::raw(content, content_type));
    }

    /// The primary content unit. Its label is the subject.
    #[must_use]
    pub const fn body(&self) -> &ContentUnit {
        &self.body
    }

    /// The primary text, when the primary content is textual.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.body.text()
    }

    /// Sets a custom header, or removes it when `value` is blank.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when `name` is blank.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> Result<&mut Self> {
        check_argument(!is_blank(Some(name)), "name")?;

        let value = value.into();
        if is_blank(Some(&value)) {
            self.remove_header(name);
        } else if let Some(slot) = self.headers.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.headers.push((name.to_string(), value));
        }

        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let index = self.headers.iter().position(|(n, _)| n == name)?;
        Some(self.headers.remove(index).1)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Custom headers in the order they were first set.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Replaces every custom header. Blank values are dropped.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error when any name is blank; the existing
    /// headers are left untouched in that case.
    pub fn replace_headers<I, K, V>(&mut self, headers: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut replacement = Self::new();
        for (name, value) in headers {
            replacement.set_header(name.as_ref(), value)?;
        }
        self.headers = replacement.headers;
        Ok(self)
    }

    pub fn attach(&mut self, attachment: ContentUnit) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Removes every attachment equal to `attachment`.
    pub fn detach(&mut self, attachment: &ContentUnit) -> &mut Self {
        self.attachments.retain(|a| a != attachment);
        self
    }

    #[must_use]
    pub fn attachments(&self) -> &[ContentUnit] {
        &self.attachments
    }

    pub fn set_attachments(&mut self, attachments: Vec<ContentUnit>) {
        self.attachments = attachments;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::content::ContentKind;

    #[test]
    fn test_append_joins_with_single_comma() {
        let mut mail = Mail::new();
        mail.add_to("a@example.com")
            .unwrap()
            .add_to("b@example.com")
            .unwrap();
        assert_eq!(mail.to().as_deref(), Some("a@example.com,b@example.com"));
        assert_eq!(mail.to_list().as_slice(), ["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_append_blank_is_rejected() {
        let mut mail = Mail::new();
        assert!(mail.add_cc("  ").unwrap_err().is_precondition());
        assert_eq!(mail.cc(), None);
    }

    #[test]
    fn test_set_replaces_and_blank_clears() {
        let mut mail = Mail::new();
        mail.add_bcc("a@example.com").unwrap();
        mail.set_bcc("c@example.com, d@example.com");
        assert_eq!(mail.bcc().as_deref(), Some("c@example.com,d@example.com"));
        mail.add_bcc("e@example.com").unwrap();
        assert_eq!(
            mail.bcc().as_deref(),
            Some("c@example.com,d@example.com,e@example.com")
        );
        mail.set_bcc("");
        assert_eq!(mail.bcc(), None);
    }

    #[test]
    fn test_stray_separators_leave_no_empty_tokens() {
        let mut mail = Mail::new();
        mail.set_to("a@x.com,");
        assert_eq!(mail.to().as_deref(), Some("a@x.com"));

        mail.set_cc(" , a@x.com,, b@x.com ,");
        assert_eq!(mail.cc_list().as_slice(), ["a@x.com", "b@x.com"]);

        mail.set_bcc(",");
        assert_eq!(mail.bcc(), None);

        mail.add_to(",b@x.com").unwrap();
        assert_eq!(mail.to().as_deref(), Some("a@x.com,b@x.com"));
        assert!(mail.add_reply_to(" , ").unwrap_err().is_precondition());
    }

    #[test]
    fn test_quoted_commas_stay_in_one_token() {
        let mut mail = Mail::new();
        mail.set_to("\"Doe, Jane\" <jane@x.com>, b@x.com");
        assert_eq!(
            mail.to_list().as_slice(),
            ["\"Doe, Jane\" <jane@x.com>", "b@x.com"]
        );
    }

    #[test]
    fn test_blank_header_removes_key() {
        let mut mail = Mail::new();
        mail.set_header("X-Priority", "1").unwrap();
        mail.set_header("X-Priority", "   ").unwrap();
        assert_eq!(mail.header("X-Priority"), None);
        assert_eq!(mail.headers().count(), 0);
    }

    #[test]
    fn test_header_overwrite_keeps_position() {
        let mut mail = Mail::new();
        mail.set_header("X-A", "1").unwrap();
        mail.set_header("X-B", "2").unwrap();
        mail.set_header("X-A", "3").unwrap();
        assert_eq!(
            mail.headers().collect::<Vec<_>>(),
            vec![("X-A", "3"), ("X-B", "2")]
        );
    }

    #[test]
    fn test_blank_header_name_is_rejected() {
        let mut mail = Mail::new();
        assert!(mail.set_header(" ", "value").unwrap_err().is_precondition());
    }

    #[test]
    fn test_replace_headers_drops_blank_values() {
        let mut mail = Mail::new();
        mail.set_header("X-Old", "gone").unwrap();
        mail.replace_headers([("X-Keep", "yes"), ("X-Drop", "")])
            .unwrap();
        assert_eq!(mail.headers().collect::<Vec<_>>(), vec![("X-Keep", "yes")]);
    }

    #[test]
    fn test_replace_headers_rejects_blank_name_atomically() {
        let mut mail = Mail::new();
        mail.set_header("X-Old", "kept").unwrap();
        assert!(mail.replace_headers([("", "x")]).is_err());
        assert_eq!(mail.header("X-Old"), Some("kept"));
    }

    #[test]
    fn test_detach_removes_every_occurrence() {
        let a = ContentUnit::attachment("a").with_label("a.txt");
        let b = ContentUnit::attachment("b").with_label("b.txt");

        let mut mail = Mail::new();
        mail.attach(a.clone()).attach(b.clone()).attach(a.clone());
        mail.detach(&a);
        assert_eq!(mail.attachments(), [b.clone()]);

        mail.detach(&a);
        assert_eq!(mail.attachments(), [b]);
    }

    #[test]
    fn test_subject_survives_body_changes() {
        let mut mail = Mail::new();
        mail.set_subject_with_charset("Olá", "ISO-8859-1");
        mail.set_html("<p>hi</p>");
        mail.set_text("hi");
        assert_eq!(mail.subject(), Some("Olá"));
        assert_eq!(mail.subject_charset(), Some("ISO-8859-1"));
        assert_eq!(mail.body().kind(), ContentKind::PlainText);
        assert_eq!(mail.text(), Some("hi"));
    }

    #[test]
    fn test_blank_from_is_absent() {
        let mut mail = Mail::new();
        mail.set_from("  ");
        mail.set_sender("s@example.com");
        assert_eq!(mail.from(), None);
        assert_eq!(mail.sender(), Some("s@example.com"));
    }
}
