//! Test outcomes and per-case records

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::matrix::TestCase;

/// Terminal classification of one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "UPPERCASE")]
pub enum TestOutcome {
    Pass,
    /// The compatibility check itself failed
    Fail { reason: String },
    /// Infrastructure or harness failure; `kind` is a short label such as
    /// `startup-timeout` or `panic`
    Error { kind: String, message: String },
    Timeout { reason: String },
    /// Never started (fail-fast or abort)
    Skipped { reason: String },
}

/// Outcome kind without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeKind {
    Pass,
    Fail,
    Error,
    Timeout,
    Skipped,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "PASS",
            OutcomeKind::Fail => "FAIL",
            OutcomeKind::Error => "ERROR",
            OutcomeKind::Timeout => "TIMEOUT",
            OutcomeKind::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TestOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        TestOutcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        TestOutcome::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        TestOutcome::Timeout {
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        TestOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            TestOutcome::Pass => OutcomeKind::Pass,
            TestOutcome::Fail { .. } => OutcomeKind::Fail,
            TestOutcome::Error { .. } => OutcomeKind::Error,
            TestOutcome::Timeout { .. } => OutcomeKind::Timeout,
            TestOutcome::Skipped { .. } => OutcomeKind::Skipped,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, TestOutcome::Pass)
    }

    /// Short diagnostic for report lines
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            TestOutcome::Pass => None,
            TestOutcome::Fail { reason }
            | TestOutcome::Timeout { reason }
            | TestOutcome::Skipped { reason } => Some(reason.clone()),
            TestOutcome::Error { kind, message } => Some(format!("{}: {}", kind, message)),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.diagnostic() {
            Some(d) => write!(f, "{}({})", self.kind(), d),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// Whole milliseconds, saturating
pub(crate) fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Everything recorded about one executed (or skipped) case
#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord {
    pub test: String,
    pub case: TestCase,
    #[serde(flatten)]
    pub outcome: TestOutcome,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Non-fatal teardown problems
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Lifecycle event lines
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
    /// Collaborator log files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log_files: Vec<PathBuf>,
}

impl CaseRecord {
    pub fn new(test: impl Into<String>, case: TestCase, outcome: TestOutcome) -> Self {
        Self {
            test: test.into(),
            case,
            outcome,
            duration: Duration::ZERO,
            warnings: Vec::new(),
            logs: Vec::new(),
            log_files: Vec::new(),
        }
    }

    /// `test[case]` label used in report lines
    pub fn label(&self) -> String {
        format!("{}[{}]", self.test, self.case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Assignment;

    #[test]
    fn test_diagnostic() {
        assert_eq!(TestOutcome::Pass.diagnostic(), None);
        assert_eq!(
            TestOutcome::error("startup-timeout", "ignite not ready").diagnostic(),
            Some("startup-timeout: ignite not ready".to_string())
        );
        assert_eq!(TestOutcome::fail("rejected").to_string(), "FAIL(rejected)");
    }

    #[test]
    fn test_record_json_shape() {
        let case = TestCase {
            ordinal: 2,
            assignments: vec![Assignment {
                axis: "server_version".to_string(),
                value: "latest".to_string(),
            }],
        };
        let mut record = CaseRecord::new("t", case, TestOutcome::timeout("case exceeded 1s"));
        record.duration = Duration::from_millis(1500);

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "TIMEOUT");
        assert_eq!(json["reason"], "case exceeded 1s");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["case"]["ordinal"], 2);
        assert!(json.get("warnings").is_none());
    }
}
