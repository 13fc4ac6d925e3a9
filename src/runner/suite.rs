//! Suite runner: bounded worker pool over every case of every test
//!
//! Cases are pulled lazily from each test's matrix expansion and admitted
//! through a semaphore sized to the configured parallelism. Each case runs
//! in its own task so a panicking body is reported as an ERROR for that case
//! only. Skipped cases (fail-fast, abort) still get a report slot.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::abort::{AbortListener, AbortReason, AbortSignal};
use crate::config::HarnessConfig;
use crate::executor::{CaseExecutor, TestDefinition};
use crate::lifecycle::{NodePool, ServiceLauncher};
use crate::matrix::TestCase;
use crate::report::{CaseRecord, ReportResult, Reporter, TestOutcome, TestReport};

/// Runs test definitions and collects their report
pub struct SuiteRunner {
    executor: Arc<CaseExecutor>,
    abort: Arc<AbortSignal>,
}

impl SuiteRunner {
    /// Runner with a node pool built from `config.testbed_nodes`
    pub fn new(config: HarnessConfig, launcher: Arc<dyn ServiceLauncher>) -> Self {
        let pool = Arc::new(NodePool::new(config.testbed_nodes.clone()));
        Self::with_pool(config, pool, launcher)
    }

    /// Runner drawing nodes from an existing pool
    pub fn with_pool(
        config: HarnessConfig,
        pool: Arc<NodePool>,
        launcher: Arc<dyn ServiceLauncher>,
    ) -> Self {
        Self {
            executor: Arc::new(CaseExecutor::new(pool, launcher, config)),
            abort: Arc::new(AbortSignal::new()),
        }
    }

    /// Signal that aborts this runner's in-flight and pending cases
    pub fn abort_signal(&self) -> Arc<AbortSignal> {
        self.abort.clone()
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        self.executor.pool()
    }

    pub fn config(&self) -> &HarnessConfig {
        self.executor.config()
    }

    /// Run every case of `tests`, returning the report in generation order
    pub async fn run(&self, tests: &[TestDefinition]) -> ReportResult<TestReport> {
        let config = self.executor.config();
        let reporter = Arc::new(Reporter::new());
        let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
        let tripped = Arc::new(AtomicBool::new(false));
        let fail_fast = config.fail_fast;
        let mut abort = self.abort.listener();
        let mut tasks = JoinSet::new();

        tracing::info!(
            tests = tests.len(),
            parallelism = config.parallelism,
            nodes = self.pool().capacity(),
            "Starting suite"
        );

        let watchdog = config.suite_timeout.map(|timeout| {
            let signal = self.abort.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                signal.abort(AbortReason::SuiteTimeout);
            })
        });

        for test in tests {
            let test = Arc::new(test.clone());
            tracing::info!(test = %test.name, cases = ?test.case_count(), "Scheduling test");

            for case in test.matrix.expand() {
                let slot = reporter.reserve(&test.name, &case);

                if let Some(reason) = self.skip_reason(&tripped) {
                    reporter.mark_skipped(slot, &reason)?;
                    continue;
                }

                let permit = tokio::select! {
                    biased;
                    _ = abort.aborted() => None,
                    permit = semaphore.clone().acquire_owned() => permit.ok(),
                };
                // Fail-fast may have tripped while waiting for the permit
                let permit = match (permit, self.skip_reason(&tripped)) {
                    (Some(permit), None) => permit,
                    (_, skip) => {
                        let reason = skip.unwrap_or_else(|| "run aborted".to_string());
                        reporter.mark_skipped(slot, &reason)?;
                        continue;
                    }
                };

                let executor = self.executor.clone();
                let listener = self.abort.listener();
                let reporter = reporter.clone();
                let tripped = tripped.clone();
                let test = test.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    let record = run_isolated(executor, test, case, listener).await;
                    if fail_fast && !record.outcome.is_pass() {
                        tripped.store(true, Ordering::SeqCst);
                    }
                    if let Err(e) = reporter.submit(slot, record) {
                        tracing::error!(error = %e, "Failed to record outcome");
                    }
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Case task failed");
            }
        }
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let report = reporter.finalize()?;
        tracing::info!(summary = %report.summary(), "Suite finished");
        Ok(report)
    }

    fn skip_reason(&self, tripped: &AtomicBool) -> Option<String> {
        if let Some(reason) = self.abort.reason() {
            return Some(format!("run aborted ({})", reason));
        }
        if tripped.load(Ordering::SeqCst) {
            return Some("earlier case did not pass (fail-fast)".to_string());
        }
        None
    }
}

/// Execute one case in its own task so a panic stays contained
async fn run_isolated(
    executor: Arc<CaseExecutor>,
    test: Arc<TestDefinition>,
    case: TestCase,
    abort: AbortListener,
) -> CaseRecord {
    let name = test.name.clone();
    let fallback_case = case.clone();
    let task = tokio::spawn(async move { executor.execute(&test, &case, abort).await });

    match task.await {
        Ok(record) => record,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            tracing::error!(test = %name, case = %fallback_case, %message, "Case panicked");
            CaseRecord::new(name, fallback_case, TestOutcome::error("panic", message))
        }
        Err(e) => CaseRecord::new(name, fallback_case, TestOutcome::error("cancelled", e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
