//! Concurrent outcome collection
//!
//! Slots are reserved in expansion order before a case is scheduled, so the
//! final report follows generation order no matter when cases finish. All
//! mutation goes through one lock.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::error::{ReportError, ReportResult};
use super::outcome::{CaseRecord, TestOutcome};
use super::summary::TestReport;
use crate::matrix::TestCase;

/// Position of a case in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(&self) -> usize {
        self.0
    }
}

enum Slot {
    Pending { test: String, case: TestCase },
    Done(CaseRecord),
}

/// Collects one outcome per reserved case
pub struct Reporter {
    slots: Mutex<Vec<Slot>>,
    started: Instant,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Reserve the next slot for `test[case]`
    pub fn reserve(&self, test: &str, case: &TestCase) -> SlotId {
        let mut slots = self.slots.lock();
        slots.push(Slot::Pending {
            test: test.to_string(),
            case: case.clone(),
        });
        SlotId(slots.len() - 1)
    }

    /// Record the outcome of a reserved case
    pub fn submit(&self, slot: SlotId, record: CaseRecord) -> ReportResult<()> {
        let mut slots = self.slots.lock();
        let len = slots.len();
        let entry = slots
            .get_mut(slot.0)
            .ok_or(ReportError::OutOfRange { slot: slot.0, len })?;
        if let Slot::Done(existing) = entry {
            return Err(ReportError::DuplicateSubmission {
                test: existing.test.clone(),
                case: existing.case.to_string(),
            });
        }
        tracing::debug!(
            test = %record.test,
            case = %record.case,
            outcome = %record.outcome.kind(),
            "Recorded outcome"
        );
        *entry = Slot::Done(record);
        Ok(())
    }

    /// Record a reserved case as never started
    pub fn mark_skipped(&self, slot: SlotId, reason: &str) -> ReportResult<()> {
        let (test, case) = {
            let slots = self.slots.lock();
            match slots.get(slot.0) {
                Some(Slot::Pending { test, case }) => (test.clone(), case.clone()),
                Some(Slot::Done(existing)) => {
                    return Err(ReportError::DuplicateSubmission {
                        test: existing.test.clone(),
                        case: existing.case.to_string(),
                    })
                }
                None => {
                    return Err(ReportError::OutOfRange {
                        slot: slot.0,
                        len: slots.len(),
                    })
                }
            }
        };
        self.submit(slot, CaseRecord::new(test, case, TestOutcome::skipped(reason)))
    }

    /// Reserved slots still waiting for an outcome
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| matches!(s, Slot::Pending { .. }))
            .count()
    }

    /// Number of reserved slots
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Final report; fails while any reserved case lacks an outcome
    pub fn finalize(&self) -> ReportResult<TestReport> {
        let slots = self.slots.lock();
        let missing = slots
            .iter()
            .filter(|s| matches!(s, Slot::Pending { .. }))
            .count();
        if missing > 0 {
            return Err(ReportError::Incomplete {
                missing,
                total: slots.len(),
            });
        }
        let records = slots
            .iter()
            .filter_map(|s| match s {
                Slot::Done(record) => Some(record.clone()),
                Slot::Pending { .. } => None,
            })
            .collect();
        Ok(TestReport::new(records, self.elapsed()))
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
