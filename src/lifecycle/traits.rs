//! Collaborator traits
//!
//! The controller never knows whether a service is a subprocess, a container
//! or an in-process stand-in. It talks to a [`ServiceLauncher`] to
//! materialize an instance on leased nodes, then drives that
//! [`ServiceInstance`] through start, readiness polling, run and stop.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::descriptor::ServiceDescriptor;
use super::error::{LifecycleError, LifecycleResult, ProvisionError};
use super::nodes::Node;

/// Flat string parameters handed to a collaborator
pub type Params = BTreeMap<String, String>;

/// Parameter carrying a server's `host:port` to a thin client application
pub const CONNECTION_PARAM: &str = "thin_client_connection";

/// Address a started server exposes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Result of running an application to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppOutcome {
    Passed,
    /// The application's own check failed
    Failed(String),
    /// The application crashed or raised
    Exception(String),
}

impl AppOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, AppOutcome::Passed)
    }
}

/// A provisioned, possibly running service
#[async_trait]
pub trait ServiceInstance: Send {
    /// Issue the start request
    ///
    /// Returns once the service has been asked to start; the controller then
    /// polls [`probe_ready`](Self::probe_ready).
    async fn start(&mut self, params: &Params) -> LifecycleResult<()>;

    /// Readiness predicate for this kind of service
    async fn probe_ready(&mut self) -> LifecycleResult<bool>;

    /// Addresses of the service's nodes, one per node
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Run an application to completion
    async fn run(&mut self, _entry_point: &str, _params: &Params) -> LifecycleResult<AppOutcome> {
        Err(LifecycleError::Unsupported("run"))
    }

    /// Graceful shutdown; the controller bounds this by the grace period
    async fn stop(&mut self) -> LifecycleResult<()>;

    /// Forced termination after the grace period expired
    async fn kill(&mut self) -> LifecycleResult<()> {
        Ok(())
    }

    /// Last-resort synchronous release when the handle is dropped unstopped
    fn kill_now(&mut self) {}

    /// Log files produced by the instance
    fn log_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Factory for service instances
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    /// Materialize `descriptor` on the leased `nodes`
    async fn materialize(
        &self,
        descriptor: &ServiceDescriptor,
        nodes: &[Node],
    ) -> Result<Box<dyn ServiceInstance>, ProvisionError>;
}
