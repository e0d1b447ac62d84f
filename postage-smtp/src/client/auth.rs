//! SASL mechanisms for `AUTH` (RFC 4954).

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD};

/// Supported SASL mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMechanism {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            _ => Err(()),
        }
    }
}

/// The PLAIN initial response: `base64("\0" username "\0" password)`.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// A LOGIN step: the base64 of one credential.
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_plain_response() {
        assert_eq!(plain_response("user", "pass"), "AHVzZXIAcGFzcw==");
        let decoded = STANDARD.decode(plain_response("user", "pass")).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn test_login_response() {
        assert_eq!(login_response("user"), "dXNlcg==");
    }

    #[test]
    fn test_mechanism_names() {
        assert_eq!("plain".parse::<AuthMechanism>(), Ok(AuthMechanism::Plain));
        assert_eq!("LOGIN".parse::<AuthMechanism>(), Ok(AuthMechanism::Login));
        assert_eq!("CRAM-MD5".parse::<AuthMechanism>(), Err(()));
    }
}
