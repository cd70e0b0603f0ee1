//! Decision audit trail: one record per evaluated message or caught failure.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use itertools::Itertools;
use log::{error, info};
use serde::Serialize;

use crate::categorizer::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AuditOutcome {
    Verdict { verdict: Verdict },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub message_id: Option<String>,
    pub message_subject: String,
    pub outcome: AuditOutcome,
    pub reasons: Vec<String>,
}

impl AuditRecord {
    pub fn verdict(message_id: &str, subject: &str, verdict: Verdict, reasons: Vec<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message_id: Some(message_id.to_string()),
            message_subject: subject.to_string(),
            outcome: AuditOutcome::Verdict { verdict },
            reasons,
        }
    }

    pub fn failure(message_id: Option<&str>, subject: &str, error: impl ToString) -> Self {
        Self {
            timestamp: Local::now(),
            message_id: message_id.map(str::to_string),
            message_subject: subject.to_string(),
            outcome: AuditOutcome::Failed {
                error: error.to_string(),
            },
            reasons: Vec::new(),
        }
    }

    fn subject_or_placeholder(&self) -> &str {
        if self.message_subject.is_empty() {
            "(no subject)"
        } else {
            &self.message_subject
        }
    }

    /// One-line description used for the log.
    pub fn summary(&self) -> String {
        let subject = self.subject_or_placeholder();
        match &self.outcome {
            AuditOutcome::Verdict {
                verdict: Verdict::Apply(tags),
            } => format!(
                "Categorizing: {} -> [{}] (reason: {})",
                subject,
                tags.join("; "),
                self.reasons.iter().join(", ")
            ),
            AuditOutcome::Verdict { verdict } if self.reasons.is_empty() => {
                format!("Skipping ({}): {}", verdict, subject)
            }
            AuditOutcome::Verdict { verdict } => format!(
                "Skipping ({}): {} (signals: {})",
                verdict,
                subject,
                self.reasons.iter().join(", ")
            ),
            AuditOutcome::Failed { error } => match &self.message_id {
                Some(id) => format!("Error processing message {}: {}", id, error),
                None => format!("Error: {}", error),
            },
        }
    }
}

/// Consumer of audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Writes every record to the log and keeps the most recent ones for the control panel.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Kept records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().cloned().collect()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, record: AuditRecord) {
        match record.outcome {
            AuditOutcome::Failed { .. } => error!("{}", record.summary()),
            AuditOutcome::Verdict { .. } => info!("{}", record.summary()),
        }

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_newest_records() {
        let log = AuditLog::new(2);
        for id in ["1", "2", "3"] {
            log.record(AuditRecord::verdict(id, "subject", Verdict::SkipNoMatch, vec![]));
        }
        let ids: Vec<Option<String>> = log.records().into_iter().map(|r| r.message_id).collect();
        assert_eq!(ids, vec![Some("2".to_string()), Some("3".to_string())]);
    }

    #[test]
    fn test_summaries() {
        let applied = AuditRecord::verdict(
            "1",
            "Reset password",
            Verdict::Apply(vec!["KARL".to_string()]),
            vec!["primary-keyword-subject".to_string(), "regex".to_string()],
        );
        assert_eq!(
            applied.summary(),
            "Categorizing: Reset password -> [KARL] (reason: primary-keyword-subject, regex)"
        );

        let skipped = AuditRecord::verdict("2", "", Verdict::SkipNoMatch, vec![]);
        assert_eq!(skipped.summary(), "Skipping (skip-no-match): (no subject)");

        let failed = AuditRecord::failure(Some("3"), "x", "store failed");
        assert_eq!(failed.summary(), "Error processing message 3: store failed");
    }

    #[test]
    fn test_record_serialization() {
        let record = AuditRecord::failure(None, "", "connection refused");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"]["kind"], "failed");
        assert_eq!(json["outcome"]["error"], "connection refused");
        assert!(json["message_id"].is_null());
    }
}
