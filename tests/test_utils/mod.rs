//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

pub mod bodies;
pub mod sim;

use std::sync::Arc;
use std::time::Duration;

use compat_matrix::config::HarnessConfig;
use compat_matrix::lifecycle::{LifecycleController, LifecycleSettings, NodePool, ServiceLauncher};

/// Install a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Harness config with timings short enough for tests
pub fn fast_config(nodes: usize, parallelism: usize) -> HarnessConfig {
    HarnessConfig::new()
        .with_testbed_size(nodes)
        .with_parallelism(parallelism)
        .with_case_timeout(Duration::from_secs(10))
        .with_startup_timeout(Duration::from_secs(2))
        .with_readiness_poll_interval(Duration::from_millis(10))
        .with_grace_period(Duration::from_millis(500))
        .with_provision_timeout(Duration::from_secs(10))
}

/// Controller settings matching [`fast_config`]
pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        startup_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        grace_period: Duration::from_millis(500),
        provision_timeout: Duration::from_secs(10),
        node_budget: None,
    }
}

/// Controller over a fresh local pool of `nodes`
pub fn controller(
    nodes: usize,
    launcher: Arc<dyn ServiceLauncher>,
    settings: LifecycleSettings,
) -> (LifecycleController, Arc<NodePool>) {
    let pool = Arc::new(NodePool::new(vec!["127.0.0.1"; nodes]));
    (LifecycleController::new(pool.clone(), launcher, settings), pool)
}
