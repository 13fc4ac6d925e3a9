//! Single-case execution
//!
//! Turns one test case into exactly one [`CaseRecord`]: build descriptors,
//! provision, start pre-started services, run the body under the case
//! timeout and the global abort, then always tear down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use super::context::CaseContext;
use super::definition::TestDefinition;
use super::error::CaseResult;
use crate::config::HarnessConfig;
use crate::lifecycle::{LifecycleController, NodePool, ProvisionError, ServiceDescriptor, ServiceLauncher};
use crate::matrix::TestCase;
use crate::report::{CaseRecord, TestOutcome};
use crate::runner::{AbortListener, AbortReason};

/// Runs cases against a shared node pool and launcher
pub struct CaseExecutor {
    pool: Arc<NodePool>,
    launcher: Arc<dyn ServiceLauncher>,
    config: HarnessConfig,
}

impl CaseExecutor {
    pub fn new(pool: Arc<NodePool>, launcher: Arc<dyn ServiceLauncher>, config: HarnessConfig) -> Self {
        Self {
            pool,
            launcher,
            config,
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Execute one case; never fails, every problem becomes the outcome
    pub async fn execute(
        &self,
        test: &TestDefinition,
        case: &TestCase,
        abort: AbortListener,
    ) -> CaseRecord {
        let span = tracing::info_span!("case", test = %test.name, case = %case);
        self.execute_inner(test, case, abort).instrument(span).await
    }

    async fn execute_inner(
        &self,
        test: &TestDefinition,
        case: &TestCase,
        mut abort: AbortListener,
    ) -> CaseRecord {
        let started = Instant::now();
        let timeout = test.timeout.unwrap_or(self.config.case_timeout);
        let mut controller = LifecycleController::new(
            self.pool.clone(),
            self.launcher.clone(),
            self.config.lifecycle_settings(test.num_nodes),
        );
        tracing::info!(?timeout, "Case started");

        let mut ctx = CaseContext::new(case, &mut controller);
        let outcome = tokio::select! {
            biased;
            reason = abort.aborted() => aborted_outcome(reason),
            result = tokio::time::timeout(timeout, run_case(test, &mut ctx)) => match result {
                Ok(Ok(())) => TestOutcome::Pass,
                Ok(Err(e)) => e.into_outcome(),
                Err(_) => TestOutcome::timeout(format!("case exceeded {}", format_duration(timeout))),
            },
        };
        let mut warnings = ctx.take_warnings();
        drop(ctx);

        warnings.extend(controller.teardown().await);
        let duration = started.elapsed();

        match &outcome {
            TestOutcome::Pass => tracing::info!(?duration, "Case passed"),
            other => tracing::warn!(?duration, outcome = %other, "Case did not pass"),
        }

        let mut record = CaseRecord::new(test.name.clone(), case.clone(), outcome);
        record.duration = duration;
        record.warnings = warnings.iter().map(ToString::to_string).collect();
        record.logs = controller
            .events()
            .iter()
            .map(|e| e.describe(started))
            .collect();
        record.log_files = controller.log_paths();
        record
    }
}

/// Provision, start and run the body; teardown is the caller's job
async fn run_case(test: &TestDefinition, ctx: &mut CaseContext<'_>) -> CaseResult<()> {
    let descriptors = dependency_order(test.template.descriptors(ctx.case())?)?;

    // One acquire for the whole case; no case waits while holding part of
    // its nodes. Past the budget, provision reports the offending service.
    let total: usize = descriptors.iter().map(|d| d.node_count).sum();
    let wanted = test.num_nodes.map_or(total, |budget| total.min(budget));
    ctx.controller().reserve(wanted).await?;

    for descriptor in descriptors {
        ctx.controller().provision(descriptor).await?;
    }
    ctx.controller().start_pre_started().await?;
    test.body.run(ctx).await
}

fn aborted_outcome(reason: AbortReason) -> TestOutcome {
    match reason {
        AbortReason::Interrupt => TestOutcome::error("aborted", "run interrupted"),
        AbortReason::SuiteTimeout => TestOutcome::timeout("suite timeout reached"),
    }
}

fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}

/// Order descriptors so every dependency precedes its dependents
///
/// Stable: independent descriptors keep their declared order. Dependencies
/// that name no descriptor in the set are left for provisioning to reject.
pub fn dependency_order(
    mut pending: Vec<ServiceDescriptor>,
) -> Result<Vec<ServiceDescriptor>, ProvisionError> {
    let names: HashSet<String> = pending.iter().map(|d| d.name.clone()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|d| {
            d.depends_on
                .iter()
                .all(|dep| placed.contains(dep) || !names.contains(dep))
        });
        let Some(index) = ready else {
            return Err(ProvisionError::InvalidDescriptor {
                service: pending[0].name.clone(),
                reason: "dependency cycle".to_string(),
            });
        };
        let descriptor = pending.remove(index);
        placed.insert(descriptor.name.clone());
        ordered.push(descriptor);
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn names(descriptors: &[ServiceDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_dependency_order_moves_dependencies_first() {
        let app = ServiceDescriptor::client_application("app", Version::Dev, "Main")
            .with_endpoint_param("conn", "ignite");
        let ignite = ServiceDescriptor::server("ignite", Version::Dev);
        let other = ServiceDescriptor::server("zookeeper", Version::Dev);

        let ordered = dependency_order(vec![app, ignite, other]).unwrap();
        assert_eq!(names(&ordered), vec!["ignite", "app", "zookeeper"]);
    }

    #[test]
    fn test_dependency_cycle_rejected() {
        let a = ServiceDescriptor::server("a", Version::Dev).depends_on("b");
        let b = ServiceDescriptor::server("b", Version::Dev).depends_on("a");
        assert!(matches!(
            dependency_order(vec![a, b]),
            Err(ProvisionError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(300)), "300s");
        assert_eq!(format_duration(Duration::from_millis(250)), "0.250s");
    }
}
