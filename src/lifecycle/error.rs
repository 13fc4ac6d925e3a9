//! Lifecycle error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reserving nodes or materializing a service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// More nodes requested than the test-bed will ever have
    #[error("requested {requested} nodes but the test-bed has {total}")]
    InsufficientCapacity { requested: usize, total: usize },

    /// Nodes exist but did not free up in time
    #[error("timed out after {waited:?} waiting for {requested} free nodes")]
    CapacityTimeout { requested: usize, waited: Duration },

    /// Descriptors of one case need more nodes than the test declares
    #[error("service {service} needs {requested} nodes, only {remaining} of the test's {budget} remain")]
    NodeBudgetExceeded {
        service: String,
        requested: usize,
        remaining: usize,
        budget: usize,
    },

    /// Descriptor is malformed
    #[error("invalid descriptor for {service}: {reason}")]
    InvalidDescriptor { service: String, reason: String },

    /// Dependency was not provisioned before its dependent
    #[error("service {service} depends on unknown service {dependency}")]
    UnknownDependency { service: String, dependency: String },

    /// Two descriptors share a name within one case
    #[error("service {0} is already provisioned")]
    DuplicateService(String),

    /// Launcher cannot produce this version/configuration
    #[error("cannot materialize {service} at version {version}: {reason}")]
    Unsupported {
        service: String,
        version: String,
        reason: String,
    },
}

/// Errors raised while driving provisioned services
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    /// Readiness was not observed before the startup deadline
    #[error("service {service} not ready after {timeout:?}")]
    StartupTimeout { service: String, timeout: Duration },

    /// Collaborator refused to start
    #[error("service {service} failed to start: {reason}")]
    Startup { service: String, reason: String },

    /// Endpoint or connection requested before readiness
    #[error("service {service} is not ready")]
    NotReady { service: String },

    /// Dependent started before its dependency reported ready
    #[error("service {service} cannot start before {dependency} is ready")]
    DependencyNotReady { service: String, dependency: String },

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("cannot {action} service {service} while {state}")]
    InvalidTransition {
        service: String,
        action: &'static str,
        state: &'static str,
    },

    /// Operation not offered by this kind of service
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Failure reported by the collaborator itself
    #[error("{service}: {reason}")]
    Collaborator { service: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifecycleError {
    /// Short label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Provision(_) => "provision",
            LifecycleError::StartupTimeout { .. } => "startup-timeout",
            LifecycleError::Startup { .. } => "startup",
            LifecycleError::NotReady { .. } => "not-ready",
            LifecycleError::DependencyNotReady { .. } => "dependency-not-ready",
            LifecycleError::UnknownService(_) => "unknown-service",
            LifecycleError::InvalidTransition { .. } => "invalid-transition",
            LifecycleError::Unsupported(_) => "unsupported",
            LifecycleError::Collaborator { .. } => "collaborator",
            LifecycleError::Io(_) => "io",
        }
    }
}

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Non-fatal problem seen while stopping a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownWarning {
    pub service: String,
    pub message: String,
}

impl fmt::Display for TeardownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.message)
    }
}
