//! Final report, summary and rendering

use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use super::outcome::{serialize_millis, CaseRecord, OutcomeKind};

/// Every case passed
pub const EXIT_ALL_PASSED: i32 = 0;
/// At least one case was not PASS
pub const EXIT_NOT_ALL_PASSED: i32 = 1;
/// Bad arguments or configuration
pub const EXIT_USAGE: i32 = 2;

/// Counts per outcome kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub timeout: usize,
    pub skipped: usize,
}

impl Summary {
    fn add(&mut self, kind: OutcomeKind) {
        self.total += 1;
        match kind {
            OutcomeKind::Pass => self.pass += 1,
            OutcomeKind::Fail => self.fail += 1,
            OutcomeKind::Error => self.error += 1,
            OutcomeKind::Timeout => self.timeout += 1,
            OutcomeKind::Skipped => self.skipped += 1,
        }
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Pass => self.pass,
            OutcomeKind::Fail => self.fail,
            OutcomeKind::Error => self.error,
            OutcomeKind::Timeout => self.timeout,
            OutcomeKind::Skipped => self.skipped,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cases: {} passed, {} failed, {} errors, {} timed out, {} skipped",
            self.total, self.pass, self.fail, self.error, self.timeout, self.skipped
        )
    }
}

/// Ordered outcomes of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    summary: Summary,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    elapsed: Duration,
    records: Vec<CaseRecord>,
}

impl TestReport {
    pub fn new(records: Vec<CaseRecord>, elapsed: Duration) -> Self {
        let mut summary = Summary::default();
        for record in &records {
            summary.add(record.outcome.kind());
        }
        Self {
            summary,
            elapsed,
            records,
        }
    }

    /// Records in generation order
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// True when every case passed (vacuously true for zero cases)
    pub fn all_passed(&self) -> bool {
        self.summary.pass == self.summary.total
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            EXIT_ALL_PASSED
        } else {
            EXIT_NOT_ALL_PASSED
        }
    }

    /// One line per case, teardown warnings indented below, then the summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            let _ = write!(
                out,
                "{:<8} {} ({:.3}s)",
                record.outcome.kind().as_str(),
                record.label(),
                record.duration.as_secs_f64()
            );
            if let Some(diagnostic) = record.outcome.diagnostic() {
                let _ = write!(out, " - {}", first_line(&diagnostic));
            }
            out.push('\n');
            for warning in &record.warnings {
                let _ = writeln!(out, "         warning: {}", warning);
            }
        }
        let _ = writeln!(out, "{} in {:.3}s", self.summary, self.elapsed.as_secs_f64());
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}
