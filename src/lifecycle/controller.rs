//! Per-case service lifecycle controller
//!
//! One controller owns every service of one test case. It enforces:
//! - dependencies are provisioned before dependents and are ready before
//!   dependents start
//! - every provisioned service is stopped exactly once, in reverse start
//!   order, even if starting it failed
//! - one failing stop never prevents the remaining stops

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::descriptor::{ParamValue, ServiceDescriptor, StartupMode};
use super::error::{LifecycleError, LifecycleResult, ProvisionError, TeardownWarning};
use super::handle::{HandleId, HandleState, ServiceHandle};
use super::nodes::{NodeLease, NodePool};
use super::traits::{AppOutcome, Endpoint, Params, ServiceInstance, ServiceLauncher};

/// Timing knobs for one controller
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Default deadline for readiness after start
    pub startup_timeout: Duration,
    /// Delay between readiness probes
    pub poll_interval: Duration,
    /// Time allowed for a graceful stop before forcing
    pub grace_period: Duration,
    /// Time allowed to wait for free test-bed nodes
    pub provision_timeout: Duration,
    /// Nodes the test declared it needs, if bounded
    pub node_budget: Option<usize>,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(10),
            provision_timeout: Duration::from_secs(120),
            node_budget: None,
        }
    }
}

/// Lifecycle transition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Provisioned,
    Starting,
    Ready,
    StartFailed,
    Running,
    Completed,
    Stopped,
    ForcedStop,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Provisioned => "provisioned",
            EventKind::Starting => "starting",
            EventKind::Ready => "ready",
            EventKind::StartFailed => "start failed",
            EventKind::Running => "running",
            EventKind::Completed => "completed",
            EventKind::Stopped => "stopped",
            EventKind::ForcedStop => "stopped (forced)",
        };
        f.write_str(s)
    }
}

/// Timestamped lifecycle transition
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub service: String,
    pub kind: EventKind,
    pub at: Instant,
}

impl LifecycleEvent {
    /// Render relative to `origin`, e.g. `+0.412s ignite ready`
    pub fn describe(&self, origin: Instant) -> String {
        format!(
            "+{:.3}s {} {}",
            self.at.saturating_duration_since(origin).as_secs_f64(),
            self.service,
            self.kind
        )
    }
}

/// Proof that a service reached readiness
#[derive(Debug, Clone)]
pub struct ReadySignal {
    pub service: String,
    pub endpoints: Vec<Endpoint>,
    pub elapsed: Duration,
}

/// Provisions, starts and tears down the services of one test case
pub struct LifecycleController {
    pool: Arc<NodePool>,
    launcher: Arc<dyn ServiceLauncher>,
    settings: LifecycleSettings,
    handles: Vec<ServiceHandle>,
    start_order: Vec<HandleId>,
    events: Vec<LifecycleEvent>,
    nodes_assigned: usize,
    /// Nodes taken for the whole case, not yet handed to a service
    reservation: Option<NodeLease>,
}

impl LifecycleController {
    /// Create a controller drawing nodes from `pool`
    pub fn new(
        pool: Arc<NodePool>,
        launcher: Arc<dyn ServiceLauncher>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            pool,
            launcher,
            settings,
            handles: Vec::new(),
            start_order: Vec::new(),
            events: Vec::new(),
            nodes_assigned: 0,
            reservation: None,
        }
    }

    /// Take `count` nodes from the pool in one step for later provisioning
    ///
    /// Services provisioned afterwards draw from this reservation before
    /// going to the pool, so a case never holds part of its nodes while
    /// waiting on another case for the rest.
    pub async fn reserve(&mut self, count: usize) -> LifecycleResult<()> {
        if count == 0 {
            return Ok(());
        }
        let lease = self
            .pool
            .acquire(count, self.settings.provision_timeout)
            .await?;
        tracing::debug!(nodes = count, "Reserved nodes for case");
        match &mut self.reservation {
            Some(held) => held.absorb(lease),
            None => self.reservation = Some(lease),
        }
        Ok(())
    }

    /// Nodes reserved but not yet assigned to a service
    pub fn unassigned_nodes(&self) -> usize {
        self.reservation.as_ref().map_or(0, NodeLease::len)
    }

    /// Find a provisioned service by name
    pub fn lookup(&self, name: &str) -> LifecycleResult<HandleId> {
        self.handles
            .iter()
            .position(|h| h.name() == name)
            .map(HandleId)
            .ok_or_else(|| LifecycleError::UnknownService(name.to_string()))
    }

    /// Current state of a service
    pub fn state(&self, id: HandleId) -> LifecycleResult<HandleState> {
        Ok(self.handle(id)?.state)
    }

    /// Descriptor a service was provisioned from
    pub fn descriptor(&self, id: HandleId) -> LifecycleResult<&ServiceDescriptor> {
        Ok(&self.handle(id)?.descriptor)
    }

    /// Handles in provisioning order
    pub fn handles(&self) -> impl Iterator<Item = HandleId> + '_ {
        (0..self.handles.len()).map(HandleId)
    }

    /// Transitions recorded so far
    pub fn events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    /// Log files reported by all instances
    pub fn log_paths(&self) -> Vec<PathBuf> {
        self.handles
            .iter()
            .flat_map(|h| h.instance.log_paths())
            .collect()
    }

    fn handle(&self, id: HandleId) -> LifecycleResult<&ServiceHandle> {
        self.handles
            .get(id.0)
            .ok_or_else(|| LifecycleError::UnknownService(format!("#{}", id.0)))
    }

    fn record(&mut self, service: &str, kind: EventKind) {
        self.events.push(LifecycleEvent {
            service: service.to_string(),
            kind,
            at: Instant::now(),
        });
    }

    /// Assign nodes to `descriptor` and materialize its instance
    ///
    /// Nodes come from the case reservation when one covers the request,
    /// otherwise straight from the pool.
    ///
    /// Dependencies must already be provisioned, which keeps the provisioning
    /// order a valid start order.
    pub async fn provision(&mut self, descriptor: ServiceDescriptor) -> LifecycleResult<HandleId> {
        descriptor.validate()?;

        if self.lookup(&descriptor.name).is_ok() {
            return Err(ProvisionError::DuplicateService(descriptor.name).into());
        }
        for dependency in &descriptor.depends_on {
            if self.lookup(dependency).is_err() {
                return Err(ProvisionError::UnknownDependency {
                    service: descriptor.name.clone(),
                    dependency: dependency.clone(),
                }
                .into());
            }
        }
        if let Some(budget) = self.settings.node_budget {
            let remaining = budget.saturating_sub(self.nodes_assigned);
            if descriptor.node_count > remaining {
                return Err(ProvisionError::NodeBudgetExceeded {
                    service: descriptor.name,
                    requested: descriptor.node_count,
                    remaining,
                    budget,
                }
                .into());
            }
        }

        let reserved = self
            .reservation
            .as_mut()
            .and_then(|held| held.split_off(descriptor.node_count));
        let lease = match reserved {
            Some(lease) => lease,
            None => {
                self.pool
                    .acquire(descriptor.node_count, self.settings.provision_timeout)
                    .await?
            }
        };
        // A failed materialize drops the lease, returning the nodes
        let instance = self.launcher.materialize(&descriptor, lease.nodes()).await?;

        tracing::info!(
            service = %descriptor.name,
            version = %descriptor.version,
            nodes = ?lease.nodes().iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            "Provisioned service"
        );

        self.nodes_assigned += descriptor.node_count;
        let id = HandleId(self.handles.len());
        let name = descriptor.name.clone();
        self.handles
            .push(ServiceHandle::new(descriptor, lease, instance));
        self.record(&name, EventKind::Provisioned);
        Ok(id)
    }

    fn check_dependencies(&self, id: HandleId) -> LifecycleResult<()> {
        let handle = self.handle(id)?;
        for dependency in &handle.descriptor.depends_on {
            let dep = self.handle(self.lookup(dependency)?)?;
            if dep.state != HandleState::Ready {
                return Err(LifecycleError::DependencyNotReady {
                    service: handle.name().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(())
    }

    fn resolve_params(&self, id: HandleId) -> LifecycleResult<Params> {
        let handle = self.handle(id)?;
        let mut params = Params::new();
        for (key, value) in &handle.descriptor.params {
            let resolved = match value {
                ParamValue::Literal(s) => s.clone(),
                ParamValue::EndpointOf(service) => {
                    self.resolve_endpoint(self.lookup(service)?)?.to_string()
                }
            };
            params.insert(key.clone(), resolved);
        }
        Ok(params)
    }

    /// Start a pre-started service and wait for readiness
    pub async fn start(&mut self, id: HandleId) -> LifecycleResult<ReadySignal> {
        let (name, timeout) = {
            let handle = self.handle(id)?;
            let name = handle.name().to_string();
            match handle.state {
                HandleState::Provisioned => {}
                HandleState::Ready => {
                    return Ok(ReadySignal {
                        service: name,
                        endpoints: handle.instance.endpoints(),
                        elapsed: Duration::ZERO,
                    })
                }
                other => {
                    return Err(LifecycleError::InvalidTransition {
                        service: name,
                        action: "start",
                        state: other.as_str(),
                    })
                }
            }
            if handle.descriptor.startup_mode == StartupMode::InvokedDirectly {
                return Err(LifecycleError::Unsupported("start on a directly invoked service"));
            }
            let timeout = handle
                .descriptor
                .startup_timeout
                .unwrap_or(self.settings.startup_timeout);
            (name, timeout)
        };

        self.check_dependencies(id)?;
        let params = self.resolve_params(id)?;

        // Recorded before starting so teardown covers a failed start
        self.start_order.push(id);
        self.record(&name, EventKind::Starting);
        tracing::debug!(service = %name, ?timeout, "Starting service");

        let begun = Instant::now();
        let poll = self.settings.poll_interval;
        let handle = &mut self.handles[id.0];
        handle.state = HandleState::Starting;
        let result = await_ready(handle.instance.as_mut(), &name, &params, timeout, poll).await;

        match result {
            Ok(()) => {
                handle.state = HandleState::Ready;
                let endpoints = handle.instance.endpoints();
                let elapsed = begun.elapsed();
                self.record(&name, EventKind::Ready);
                tracing::info!(service = %name, ?elapsed, "Service ready");
                Ok(ReadySignal {
                    service: name,
                    endpoints,
                    elapsed,
                })
            }
            Err(e) => {
                handle.state = HandleState::Failed;
                self.record(&name, EventKind::StartFailed);
                tracing::warn!(service = %name, error = %e, "Service failed to start");
                Err(e)
            }
        }
    }

    /// Start every pre-started service in provisioning order
    pub async fn start_pre_started(&mut self) -> LifecycleResult<Vec<ReadySignal>> {
        let mut signals = Vec::new();
        for index in 0..self.handles.len() {
            let eligible = {
                let handle = &self.handles[index];
                handle.descriptor.startup_mode == StartupMode::PreStarted
                    && handle.state == HandleState::Provisioned
            };
            if eligible {
                signals.push(self.start(HandleId(index)).await?);
            }
        }
        Ok(signals)
    }

    /// Run a directly invoked application to completion
    pub async fn run(&mut self, id: HandleId) -> LifecycleResult<AppOutcome> {
        let (name, entry_point) = {
            let handle = self.handle(id)?;
            let name = handle.name().to_string();
            if handle.state != HandleState::Provisioned {
                return Err(LifecycleError::InvalidTransition {
                    service: name,
                    action: "run",
                    state: handle.state.as_str(),
                });
            }
            if handle.descriptor.startup_mode != StartupMode::InvokedDirectly {
                return Err(LifecycleError::Unsupported("run on a pre-started service"));
            }
            let entry_point = handle.descriptor.entry_point.clone().ok_or_else(|| {
                ProvisionError::InvalidDescriptor {
                    service: name.clone(),
                    reason: "missing entry point".to_string(),
                }
            })?;
            (name, entry_point)
        };

        self.check_dependencies(id)?;
        let params = self.resolve_params(id)?;

        self.start_order.push(id);
        self.record(&name, EventKind::Running);
        tracing::info!(service = %name, entry_point = %entry_point, "Running application");

        let handle = &mut self.handles[id.0];
        handle.state = HandleState::Running;
        let result = handle.instance.run(&entry_point, &params).await;

        match result {
            Ok(outcome) => {
                handle.state = HandleState::Completed;
                self.record(&name, EventKind::Completed);
                tracing::info!(service = %name, ?outcome, "Application finished");
                Ok(outcome)
            }
            Err(e) => {
                handle.state = HandleState::Failed;
                self.record(&name, EventKind::StartFailed);
                Err(e)
            }
        }
    }

    /// First endpoint of a ready service
    pub fn resolve_endpoint(&self, id: HandleId) -> LifecycleResult<Endpoint> {
        let handle = self.handle(id)?;
        self.resolve_endpoints(id)?
            .into_iter()
            .next()
            .ok_or_else(|| LifecycleError::Collaborator {
                service: handle.name().to_string(),
                reason: "service exposes no endpoints".to_string(),
            })
    }

    /// All endpoints of a ready service
    pub fn resolve_endpoints(&self, id: HandleId) -> LifecycleResult<Vec<Endpoint>> {
        let handle = self.handle(id)?;
        if handle.state != HandleState::Ready {
            return Err(LifecycleError::NotReady {
                service: handle.name().to_string(),
            });
        }
        Ok(handle.instance.endpoints())
    }

    /// Stop a service; stopping an already stopped service does nothing
    ///
    /// Graceful stop is bounded by the grace period, after which the
    /// instance is killed. Nodes go back to the pool either way.
    pub async fn stop(&mut self, id: HandleId) -> Option<TeardownWarning> {
        let grace = self.settings.grace_period;
        let Some(handle) = self.handles.get_mut(id.0) else {
            return Some(TeardownWarning {
                service: format!("#{}", id.0),
                message: "unknown service".to_string(),
            });
        };
        if handle.state == HandleState::Stopped {
            return None;
        }
        let name = handle.name().to_string();

        let mut problem = match tokio::time::timeout(grace, handle.instance.stop()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("graceful stop failed: {}", e)),
            Err(_) => Some(format!("did not stop within {:?}", grace)),
        };
        let forced = problem.is_some();
        if forced {
            let killed = match tokio::time::timeout(grace, handle.instance.kill()).await {
                Ok(r) => r.map_err(|e| e.to_string()),
                Err(_) => Err(format!("kill did not finish within {:?}", grace)),
            };
            if let Err(e) = killed {
                problem = problem.map(|p| format!("{}; forced kill failed: {}", p, e));
            }
        }

        handle.state = HandleState::Stopped;
        handle.lease.take();
        self.record(
            &name,
            if forced {
                EventKind::ForcedStop
            } else {
                EventKind::Stopped
            },
        );

        match problem {
            Some(message) => {
                tracing::warn!(service = %name, %message, "Teardown warning");
                Some(TeardownWarning {
                    service: name,
                    message,
                })
            }
            None => {
                tracing::debug!(service = %name, "Service stopped");
                None
            }
        }
    }

    /// Stop everything: reverse start order, then never-started services
    /// in reverse provisioning order
    pub async fn teardown(&mut self) -> Vec<TeardownWarning> {
        let mut order: Vec<HandleId> = self.start_order.iter().rev().copied().collect();
        for index in (0..self.handles.len()).rev() {
            let id = HandleId(index);
            if !order.contains(&id) {
                order.push(id);
            }
        }

        let mut warnings = Vec::new();
        for id in order {
            if let Some(warning) = self.stop(id).await {
                warnings.push(warning);
            }
        }
        self.reservation = None;
        warnings
    }
}

/// Issue start and poll readiness until `timeout` elapses
async fn await_ready(
    instance: &mut dyn ServiceInstance,
    service: &str,
    params: &Params,
    timeout: Duration,
    poll: Duration,
) -> LifecycleResult<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let timed_out = || LifecycleError::StartupTimeout {
        service: service.to_string(),
        timeout,
    };

    match tokio::time::timeout_at(deadline, instance.start(params)).await {
        Ok(result) => result?,
        Err(_) => return Err(timed_out()),
    }

    loop {
        match tokio::time::timeout_at(deadline, instance.probe_ready()).await {
            Ok(Ok(true)) => return Ok(()),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(timed_out()),
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }
        tokio::time::sleep_until((now + poll).min(deadline)).await;
    }
}
