//! Mailbox list parsing for header address fields.
//!
//! The list grammar of RFC 5322 (display names, quoted phrases, groups) is
//! handled by `mailparse`. Each resulting addr-spec is then checked against
//! the stricter mailbox grammar SMTP itself accepts:
//!
//! ```text
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Dot-string     = Atom *("." Atom)
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! address-literal = "[" ( IPv4 / "IPv6:" IPv6 / tag ":" value ) "]"
//! ```
//!
//! Group members are flattened into the surrounding list; the group name
//! itself is dropped.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use mailparse::{MailAddr, SingleInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_LOCAL_PART: usize = 64;
const MAX_DOMAIN: usize = 255;

/// Result type for address parsing
pub type Result<T> = std::result::Result<T, AddressError>;

/// Reasons an address string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Malformed address list: {0}")]
    List(String),
    #[error("Local-part exceeds {MAX_LOCAL_PART} octets")]
    LocalPartTooLong,
    #[error("Domain exceeds {MAX_DOMAIN} octets")]
    DomainTooLong,
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,
    #[error("Expected exactly one mailbox, found {0}")]
    NotSingle(usize),
}

/// A parsed mailbox, optionally carrying a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub local_part: String,
    pub domain: String,
}

impl Mailbox {
    /// The bare `local-part@domain` form used on the SMTP envelope.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }

    fn from_single(info: &SingleInfo) -> Result<Self> {
        let (local_part, domain) = parse_addr_spec(&info.addr)?;
        let display_name = info
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned);

        Ok(Self {
            display_name,
            local_part,
            domain,
        })
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) if name.chars().all(is_phrase_char) => {
                write!(f, "{name} <{}@{}>", self.local_part, self.domain)
            }
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}@{}>", self.local_part, self.domain)
            }
            None => write!(f, "{}@{}", self.local_part, self.domain),
        }
    }
}

impl FromStr for Mailbox {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self> {
        let mut list = parse_address_list(s)?;
        match list.len() {
            0 => Err(AddressError::Empty),
            1 => Ok(list.remove(0)),
            n => Err(AddressError::NotSingle(n)),
        }
    }
}

/// Parses a comma-separated address list into zero or more mailboxes.
///
/// A blank input yields an empty list.
///
/// # Errors
///
/// Returns an [`AddressError`] when the list grammar or any mailbox is invalid.
pub fn parse_address_list(input: &str) -> Result<Vec<Mailbox>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let parsed = mailparse::addrparse(input).map_err(|e| AddressError::List(e.to_string()))?;

    let mut mailboxes = Vec::with_capacity(parsed.len());
    for addr in parsed.iter() {
        match addr {
            MailAddr::Single(info) => mailboxes.push(Mailbox::from_single(info)?),
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    mailboxes.push(Mailbox::from_single(info)?);
                }
            }
        }
    }

    Ok(mailboxes)
}

/// Splits and validates a bare `local-part@domain`.
fn parse_addr_spec(input: &str) -> Result<(String, String)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    let at = find_unquoted_at(input).ok_or(AddressError::MissingAtSign)?;
    let (local, domain) = (&input[..at], &input[at + 1..]);

    if local.len() > MAX_LOCAL_PART {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN {
        return Err(AddressError::DomainTooLong);
    }

    check_local_part(local)?;
    if domain.starts_with('[') {
        check_address_literal(domain)?;
    } else {
        check_domain(domain)?;
    }

    Ok((local.to_string(), domain.to_string()))
}

/// Position of the `@` outside any quoted string or address literal.
fn find_unquoted_at(input: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' if !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '@' if !in_quotes && !in_brackets => return Some(i),
            _ => {}
        }
    }

    None
}

fn check_local_part(local: &str) -> Result<()> {
    if local.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty".to_string()));
    }

    if let Some(quoted) = local.strip_prefix('"') {
        let content = quoted
            .strip_suffix('"')
            .ok_or(AddressError::UnclosedQuotedString)?;
        let mut chars = content.chars();
        while let Some(ch) = chars.next() {
            let valid = if ch == '\\' {
                chars.next().is_some_and(|next| next == ' ' || next.is_ascii_graphic())
            } else {
                matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
            };
            if !valid {
                return Err(AddressError::InvalidLocalPart(format!(
                    "invalid character in quoted string near '{ch}'"
                )));
            }
        }
        return Ok(());
    }

    for atom in local.split('.') {
        if atom.is_empty() {
            return Err(AddressError::InvalidLocalPart(format!(
                "empty atom in '{local}'"
            )));
        }
        if let Some(bad) = atom.chars().find(|&c| !is_atext(c)) {
            return Err(AddressError::InvalidLocalPart(format!(
                "invalid character '{bad}'"
            )));
        }
    }

    Ok(())
}

fn check_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(AddressError::InvalidDomain("empty".to_string()));
    }

    for label in domain.split('.') {
        let first = label.chars().next();
        let last = label.chars().last();
        let edges_ok = first.is_some_and(|c| c.is_ascii_alphanumeric())
            && last.is_some_and(|c| c.is_ascii_alphanumeric());

        if !edges_ok || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(AddressError::InvalidDomain(format!(
                "bad label '{label}' in '{domain}'"
            )));
        }
    }

    Ok(())
}

fn check_address_literal(domain: &str) -> Result<()> {
    let content = domain
        .strip_prefix('[')
        .and_then(|d| d.strip_suffix(']'))
        .ok_or_else(|| AddressError::InvalidAddressLiteral(domain.to_string()))?;

    let valid = content.parse::<Ipv4Addr>().is_ok()
        || content
            .strip_prefix("IPv6:")
            .is_some_and(|v6| v6.parse::<Ipv6Addr>().is_ok())
        || content
            .split_once(':')
            .is_some_and(|(tag, value)| !tag.is_empty() && !value.is_empty());

    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidAddressLiteral(content.to_string()))
    }
}

/// atext = ALPHA / DIGIT / "!" / "#" / "$" / "%" / "&" / "'" / "*" / "+" /
///         "-" / "/" / "=" / "?" / "^" / "_" / "`" / "{" / "|" / "}" / "~"
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// Characters a display name may contain without being quoted.
fn is_phrase_char(ch: char) -> bool {
    ch == ' ' || is_atext(ch) || !ch.is_ascii()
}
