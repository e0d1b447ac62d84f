//! Per-mail results of a batch.

use std::fmt;

use chrono::{DateTime, Utc};

/// What happened to one mail of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailOutcome {
    /// Accepted by the server.
    Sent { message_id: String },
    /// Refused or failed in flight; the batch continued.
    Failed { reason: String },
    /// Never tried, because the connection failed or the batch stopped early.
    NotAttempted,
}

impl MailOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

impl fmt::Display for MailOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { message_id } => write!(f, "sent {message_id}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::NotAttempted => f.write_str("not attempted"),
        }
    }
}

/// Outcome of [`DeliveryAgent::send_batch`](crate::DeliveryAgent::send_batch):
/// one entry per input mail, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    sent_at: DateTime<Utc>,
    outcomes: Vec<MailOutcome>,
    connection_failure: Option<String>,
}

impl DeliveryReport {
    /// A report where nothing has been attempted yet.
    #[must_use]
    pub fn new(sent_at: DateTime<Utc>, mails: usize) -> Self {
        Self {
            sent_at,
            outcomes: vec![MailOutcome::NotAttempted; mails],
            connection_failure: None,
        }
    }

    /// The timestamp stamped on every message of the batch.
    #[must_use]
    pub const fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    #[must_use]
    pub fn outcomes(&self) -> &[MailOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&MailOutcome> {
        self.outcomes.get(index)
    }

    /// Why the connection could not be opened, if it could not.
    #[must_use]
    pub fn connection_failure(&self) -> Option<&str> {
        self.connection_failure.as_deref()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_sent()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MailOutcome::Failed { .. }))
            .count()
    }

    #[must_use]
    pub fn not_attempted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MailOutcome::NotAttempted))
            .count()
    }

    /// `true` when every mail was sent.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(MailOutcome::is_sent)
    }

    pub(crate) fn record(&mut self, index: usize, outcome: MailOutcome) {
        if let Some(slot) = self.outcomes.get_mut(index) {
            *slot = outcome;
        }
    }

    pub(crate) fn set_connection_failure(&mut self, reason: impl Into<String>) {
        self.connection_failure = Some(reason.into());
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sent, {} failed, {} not attempted",
            self.sent_count(),
            self.failed_count(),
            self.not_attempted_count()
        )?;
        if let Some(reason) = &self.connection_failure {
            write!(f, " (connection failed: {reason})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_counts_and_summary() {
        let mut report = DeliveryReport::new(Utc::now(), 3);
        assert!(!report.is_complete());

        report.record(
            0,
            MailOutcome::Sent {
                message_id: "<a@localhost>".to_string(),
            },
        );
        report.record(
            1,
            MailOutcome::Failed {
                reason: "refused".to_string(),
            },
        );
        report.record(7, MailOutcome::NotAttempted);

        assert_eq!(report.sent_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.not_attempted_count(), 1);
        assert_eq!(report.to_string(), "1 sent, 1 failed, 1 not attempted");
        assert_eq!(report.outcome(1).unwrap().to_string(), "failed: refused");
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let report = DeliveryReport::new(Utc::now(), 0);
        assert!(report.is_complete());
        assert!(report.outcomes().is_empty());
    }

    #[test]
    fn test_connection_failure_summary() {
        let mut report = DeliveryReport::new(Utc::now(), 2);
        report.set_connection_failure("refused");
        assert_eq!(
            report.to_string(),
            "0 sent, 0 failed, 2 not attempted (connection failed: refused)"
        );
    }
}
