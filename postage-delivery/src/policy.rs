//! What a batch does when a mail cannot be delivered.

use std::{fmt, str::FromStr};

use postage_common::MailError;
use serde::Deserialize;

/// Failure handling for [`DeliveryAgent::send_batch`](crate::DeliveryAgent::send_batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Record failures in the report and keep going.
    BestEffort,
}

impl FailurePolicy {
    /// Property selecting the policy used by the command-line tool.
    pub const PROPERTY: &'static str = "delivery.policy";

    /// Whether `error` is recorded rather than returned. Precondition
    /// violations are never suppressed.
    #[must_use]
    pub const fn suppresses(self, error: &MailError) -> bool {
        matches!(self, Self::BestEffort) && !error.is_precondition()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::BestEffort => "best_effort",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" | "strict" => Ok(Self::Abort),
            "best_effort" | "silent" => Ok(Self::BestEffort),
            other => Err(format!("Unknown failure policy '{other}'")),
        }
    }
}
