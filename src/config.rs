//! Harness configuration

use std::thread;
use std::time::Duration;

use crate::lifecycle::LifecycleSettings;

/// Default per-case wall-clock limit (5 minutes)
pub const DEFAULT_CASE_TIMEOUT_SECS: u64 = 300;

/// Default deadline for a service to report ready
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

/// Default delay between readiness probes
pub const DEFAULT_READINESS_POLL_MS: u64 = 100;

/// Default time a service gets to stop before it is killed
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Default time a case waits for free test-bed nodes
pub const DEFAULT_PROVISION_TIMEOUT_SECS: u64 = 120;

/// Default test-bed size
pub const DEFAULT_TESTBED_NODES: usize = 4;

/// Host used for the default test-bed
pub const DEFAULT_TESTBED_HOST: &str = "127.0.0.1";

/// Configuration for a harness run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Maximum number of cases executing at once
    pub parallelism: usize,

    /// Wall-clock limit for one case, unless the test declares its own
    pub case_timeout: Duration,

    /// Deadline for a service to report ready
    pub startup_timeout: Duration,

    /// Delay between readiness probes
    pub readiness_poll_interval: Duration,

    /// Time a service gets to stop gracefully
    pub grace_period: Duration,

    /// Time a case waits for free test-bed nodes
    pub provision_timeout: Duration,

    /// One host entry per test-bed node
    pub testbed_nodes: Vec<String>,

    /// Skip remaining cases after the first non-passing one
    pub fail_fast: bool,

    /// Limit for the whole run (None = unlimited)
    pub suite_timeout: Option<Duration>,

    /// Release that `latest` resolves to
    pub latest_release: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            case_timeout: Duration::from_secs(DEFAULT_CASE_TIMEOUT_SECS),
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            readiness_poll_interval: Duration::from_millis(DEFAULT_READINESS_POLL_MS),
            grace_period: Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS),
            provision_timeout: Duration::from_secs(DEFAULT_PROVISION_TIMEOUT_SECS),
            testbed_nodes: vec![DEFAULT_TESTBED_HOST.to_string(); DEFAULT_TESTBED_NODES],
            fail_fast: false,
            suite_timeout: None,
            latest_release: None,
        }
    }
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl HarnessConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parallelism bound (at least 1)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the per-case timeout
    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    /// Set the startup timeout
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the readiness poll interval
    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }

    /// Set the stop grace period
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the provisioning timeout
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Use `count` test-bed nodes on the default host
    pub fn with_testbed_size(mut self, count: usize) -> Self {
        self.testbed_nodes = vec![DEFAULT_TESTBED_HOST.to_string(); count];
        self
    }

    /// Use explicit test-bed hosts, one node each
    pub fn with_testbed_nodes<I, H>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.testbed_nodes = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable fail-fast
    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    /// Set or clear the suite timeout
    pub fn with_suite_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.suite_timeout = timeout;
        self
    }

    /// Set the release `latest` resolves to
    pub fn with_latest_release(mut self, release: impl Into<String>) -> Self {
        self.latest_release = Some(release.into());
        self
    }

    /// Lifecycle settings for a test that declares `num_nodes`
    pub fn lifecycle_settings(&self, num_nodes: Option<usize>) -> LifecycleSettings {
        LifecycleSettings {
            startup_timeout: self.startup_timeout,
            poll_interval: self.readiness_poll_interval,
            grace_period: self.grace_period,
            provision_timeout: self.provision_timeout,
            node_budget: num_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert!(config.parallelism >= 1);
        assert_eq!(config.case_timeout, Duration::from_secs(300));
        assert_eq!(config.testbed_nodes.len(), DEFAULT_TESTBED_NODES);
        assert!(!config.fail_fast);
        assert!(config.suite_timeout.is_none());
    }

    #[test]
    fn test_parallelism_floor() {
        assert_eq!(HarnessConfig::new().with_parallelism(0).parallelism, 1);
    }

    #[test]
    fn test_lifecycle_settings() {
        let config = HarnessConfig::new()
            .with_startup_timeout(Duration::from_secs(5))
            .with_grace_period(Duration::from_millis(250));
        let settings = config.lifecycle_settings(Some(2));
        assert_eq!(settings.startup_timeout, Duration::from_secs(5));
        assert_eq!(settings.grace_period, Duration::from_millis(250));
        assert_eq!(settings.node_budget, Some(2));
    }
}
