//! Handles to provisioned services

use std::fmt;

use super::descriptor::ServiceDescriptor;
use super::nodes::NodeLease;
use super::traits::ServiceInstance;

/// Opaque reference to a service within one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) usize);

/// Where a handle is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Provisioned,
    Starting,
    Ready,
    /// Directly invoked application is running
    Running,
    /// Directly invoked application finished
    Completed,
    Failed,
    Stopped,
}

impl HandleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleState::Provisioned => "provisioned",
            HandleState::Starting => "starting",
            HandleState::Ready => "ready",
            HandleState::Running => "running",
            HandleState::Completed => "completed",
            HandleState::Failed => "failed",
            HandleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioned service: descriptor, leased nodes and live instance
pub(crate) struct ServiceHandle {
    pub(crate) descriptor: ServiceDescriptor,
    pub(crate) lease: Option<NodeLease>,
    pub(crate) instance: Box<dyn ServiceInstance>,
    pub(crate) state: HandleState,
}

impl ServiceHandle {
    pub(crate) fn new(
        descriptor: ServiceDescriptor,
        lease: NodeLease,
        instance: Box<dyn ServiceInstance>,
    ) -> Self {
        Self {
            descriptor,
            lease: Some(lease),
            instance,
            state: HandleState::Provisioned,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if self.state != HandleState::Stopped {
            tracing::warn!(
                service = %self.descriptor.name,
                state = %self.state,
                "Service dropped without teardown, forcing release"
            );
            self.instance.kill_now();
        }
        // Lease returns its nodes when dropped
    }
}
