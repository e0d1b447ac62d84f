//! ESMTP extensions advertised in an EHLO reply.

use super::{auth::AuthMechanism, response::Response};

/// What the server said it supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub starttls: bool,
    pub auth: Vec<AuthMechanism>,
    /// Maximum message size; `Some(0)` means the server announced no limit.
    pub size: Option<usize>,
    pub eight_bit_mime: bool,
    pub pipelining: bool,
}

impl Capabilities {
    /// Reads the extension lines of an EHLO reply. The first line is the
    /// server's greeting and is skipped.
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let mut capabilities = Self::default();

        for line in response.lines.iter().skip(1) {
            let mut words = line.split_ascii_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };

            match keyword.to_ascii_uppercase().as_str() {
                "STARTTLS" => capabilities.starttls = true,
                "8BITMIME" => capabilities.eight_bit_mime = true,
                "PIPELINING" => capabilities.pipelining = true,
                "SIZE" => {
                    capabilities.size = Some(words.next().and_then(|s| s.parse().ok()).unwrap_or(0));
                }
                "AUTH" => {
                    for mechanism in words.filter_map(|w| w.parse().ok()) {
                        if !capabilities.auth.contains(&mechanism) {
                            capabilities.auth.push(mechanism);
                        }
                    }
                }
                _ => {}
            }
        }

        capabilities
    }

    /// The mechanism to authenticate with: PLAIN when offered, then LOGIN.
    #[must_use]
    pub fn preferred_auth(&self) -> Option<AuthMechanism> {
        [AuthMechanism::Plain, AuthMechanism::Login]
            .into_iter()
            .find(|m| self.auth.contains(m))
    }

    /// `true` when a message of `size` octets exceeds an announced limit.
    #[must_use]
    pub fn exceeds_size(&self, size: usize) -> bool {
        self.size.is_some_and(|limit| limit > 0 && size > limit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ehlo(lines: &[&str]) -> Response {
        Response::new(250, lines.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_parses_extensions() {
        let capabilities = Capabilities::from_ehlo(&ehlo(&[
            "mail.example.com greets you",
            "PIPELINING",
            "SIZE 35882577",
            "AUTH LOGIN PLAIN XOAUTH2",
            "AUTH=LOGIN",
            "starttls",
            "8BITMIME",
        ]));

        assert_eq!(
            capabilities,
            Capabilities {
                starttls: true,
                auth: vec![AuthMechanism::Login, AuthMechanism::Plain],
                size: Some(35_882_577),
                eight_bit_mime: true,
                pipelining: true,
            }
        );
        assert_eq!(capabilities.preferred_auth(), Some(AuthMechanism::Plain));
        assert!(capabilities.exceeds_size(40_000_000));
        assert!(!capabilities.exceeds_size(1_000));
    }

    #[test]
    fn test_greeting_line_is_not_an_extension() {
        let capabilities = Capabilities::from_ehlo(&ehlo(&["STARTTLS"]));
        assert!(!capabilities.starttls);
    }

    #[test]
    fn test_size_without_limit() {
        let capabilities = Capabilities::from_ehlo(&ehlo(&["host", "SIZE"]));
        assert_eq!(capabilities.size, Some(0));
        assert!(!capabilities.exceeds_size(usize::MAX));
    }
}
