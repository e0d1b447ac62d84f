//! Session configuration.
//!
//! Configuration is a flat map of dotted keys to string values, the same
//! shape a mail session's property set has. It can be built in code or loaded
//! from TOML, where nested tables flatten into dotted keys:
//!
//! ```toml
//! [transport]
//! protocol = "smtp"
//!
//! [transport.smtp]
//! host = "mail.example.com"
//! port = 587
//! auth = true
//! username = "postmaster"
//! password = "secret"
//! starttls = "required"
//! ```
//!
//! [`TransportSettings::from_properties`] resolves the keys a connection needs.

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default transport protocol.
pub const DEFAULT_PROTOCOL: &str = "smtp";
/// Default host for both protocols.
pub const DEFAULT_HOST: &str = "localhost";
/// Default per-command timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unsupported transport protocol '{0}'")]
    UnsupportedProtocol(String),

    #[error("Missing required property: {0}")]
    MissingProperty(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// An ordered map of dotted configuration keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Returns the value for `key`, treating blank values as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// `true` only when the value is `"true"`, ignoring case.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Parses the value for `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the value does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses TOML text, flattening nested tables into dotted keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text.parse()?;
        let mut properties = Self::new();
        flatten(&mut properties, None, &table);
        Ok(properties)
    }

    /// Loads properties from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn flatten(properties: &mut Properties, prefix: Option<&str>, table: &toml::Table) {
    for (key, value) in table {
        let key = prefix.map_or_else(|| key.clone(), |p| format!("{p}.{key}"));
        match value {
            toml::Value::Table(inner) => flatten(properties, Some(&key), inner),
            toml::Value::String(s) => properties.set(key, s.clone()),
            toml::Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        toml::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                properties.set(key, joined);
            }
            other => properties.set(key, other.to_string()),
        }
    }
}

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain SMTP, optionally upgraded with STARTTLS.
    Smtp,
    /// SMTP over implicit TLS.
    Smtps,
}

impl Protocol {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Smtps => "smtps",
        }
    }

    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Smtp => 25,
            Self::Smtps => 465,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "smtps" => Ok(Self::Smtps),
            other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// STARTTLS policy for plain SMTP connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade when the server advertises STARTTLS, otherwise stay in plaintext.
    #[default]
    Opportunistic,
    /// Fail the connection unless STARTTLS succeeds.
    Required,
    /// Never attempt STARTTLS.
    Disabled,
}

impl FromStr for TlsPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opportunistic" | "true" => Ok(Self::Opportunistic),
            "required" => Ok(Self::Required),
            "disabled" | "false" | "none" => Ok(Self::Disabled),
            _ => Err(()),
        }
    }
}

/// Username and password for an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to open one transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Present only when `transport.<protocol>.auth` is enabled.
    pub credentials: Option<Credentials>,
    pub tls_policy: TlsPolicy,
    pub accept_invalid_certs: bool,
    /// Domain announced in EHLO/HELO.
    pub helo_domain: String,
    pub command_timeout: Duration,
    /// Envelope sender override.
    pub envelope_from: Option<String>,
}

impl TransportSettings {
    /// Resolves transport settings from session properties.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown protocol, malformed numeric or policy
    /// values, or missing credentials when authentication is enabled.
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let protocol: Protocol = properties
            .get_or("transport.protocol", DEFAULT_PROTOCOL)
            .parse()?;
        let key = |name: &str| format!("transport.{protocol}.{name}");

        let credentials = if properties.get_bool(&key("auth")) {
            let username = properties
                .get(&key("username"))
                .ok_or_else(|| ConfigError::MissingProperty(key("username")))?;
            let password = properties
                .get(&key("password"))
                .ok_or_else(|| ConfigError::MissingProperty(key("password")))?;
            Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        } else {
            None
        };

        let tls_policy = match properties.get(&key("starttls")) {
            None => TlsPolicy::default(),
            Some(value) => value.parse().map_err(|()| ConfigError::InvalidValue {
                key: key("starttls"),
                value: value.to_string(),
            })?,
        };

        let timeout_secs = properties
            .get_parsed::<u64>(&key("timeout"))?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            protocol,
            host: properties.get_or(&key("host"), DEFAULT_HOST).trim().to_string(),
            port: properties
                .get_parsed::<u16>(&key("port"))?
                .unwrap_or_else(|| protocol.default_port()),
            credentials,
            tls_policy,
            accept_invalid_certs: properties.get_bool(&key("accept_invalid_certs")),
            helo_domain: properties
                .get_or(&key("localhost"), DEFAULT_HOST)
                .trim()
                .to_string(),
            command_timeout: Duration::from_secs(timeout_secs),
            envelope_from: properties.get(&key("from")).map(|v| v.trim().to_string()),
        })
    }

    /// `host:port`, suitable for connecting.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
