//! Simulated collaborators that record what the harness does to them.
//!
//! Every instance logs timestamped lifecycle calls into a shared
//! [`SimState`], counts its stops and tracks how many instances are alive at
//! once. Behaviors are chosen per service name and/or version.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use compat_matrix::lifecycle::{
    AppOutcome, Endpoint, LifecycleError, LifecycleResult, Node, ParamValue, Params,
    ProvisionError, ServiceDescriptor, ServiceInstance, ServiceLauncher,
};
use compat_matrix::version::Version;

/// Descriptor parameter the sim reads to tag instances with their case
pub const CASE_PARAM: &str = "case";

/// What a simulated service does
#[derive(Debug, Clone)]
pub enum Behavior {
    /// `start` returns an error
    FailStart,
    /// Readiness never reported
    NeverReady,
    /// Ready this long after start
    ReadyAfter(Duration),
    /// `run` reports a failed check
    AppFails,
    /// `run` reports a crash
    AppRaises,
    /// `run` takes this long
    RunFor(Duration),
    /// `stop` takes this long
    SlowStop(Duration),
    /// `stop` returns an error
    FailStop,
}

/// Applies a behavior to matching descriptors
#[derive(Debug, Clone)]
pub struct SimRule {
    service: Option<String>,
    version: Option<Version>,
    behavior: Behavior,
}

impl SimRule {
    pub fn any(behavior: Behavior) -> Self {
        Self {
            service: None,
            version: None,
            behavior,
        }
    }

    pub fn service(name: &str, behavior: Behavior) -> Self {
        Self {
            service: Some(name.to_string()),
            version: None,
            behavior,
        }
    }

    pub fn version(version: Version, behavior: Behavior) -> Self {
        Self {
            service: None,
            version: Some(version),
            behavior,
        }
    }

    fn matches(&self, descriptor: &ServiceDescriptor) -> bool {
        self.service.as_ref().map_or(true, |s| *s == descriptor.name)
            && self.version.as_ref().map_or(true, |v| *v == descriptor.version)
    }
}

/// Lifecycle call observed by the sim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    Start,
    Ready,
    Run,
    Stop,
    Kill,
}

#[derive(Debug, Clone)]
pub struct SimEvent {
    pub instance: usize,
    pub service: String,
    pub case: Option<String>,
    pub call: SimCall,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct SimInstanceInfo {
    pub id: usize,
    pub service: String,
    pub version: Version,
    pub case: Option<String>,
    pub nodes: usize,
}

/// Shared record of everything the sim saw
#[derive(Default)]
pub struct SimState {
    events: Mutex<Vec<SimEvent>>,
    instances: Mutex<Vec<SimInstanceInfo>>,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl SimState {
    fn record(&self, instance: &SimInstance, call: SimCall) {
        self.events.lock().push(SimEvent {
            instance: instance.id,
            service: instance.service.clone(),
            case: instance.case.clone(),
            call,
            at: Instant::now(),
        });
    }

    fn acquire(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.lock().clone()
    }

    pub fn instances(&self) -> Vec<SimInstanceInfo> {
        self.instances.lock().clone()
    }

    /// Instances not yet stopped, killed or dropped
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Number of `call`s an instance received
    pub fn count(&self, instance: usize, call: SimCall) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.instance == instance && e.call == call)
            .count()
    }

    /// First time `service` in `case` received `call`
    pub fn first(&self, case: Option<&str>, service: &str, call: SimCall) -> Option<Instant> {
        self.events
            .lock()
            .iter()
            .find(|e| e.service == service && e.case.as_deref() == case && e.call == call)
            .map(|e| e.at)
    }

    /// Services in the order they received `call`
    pub fn order_of(&self, call: SimCall) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.call == call)
            .map(|e| e.service.clone())
            .collect()
    }
}

/// Launcher producing [`SimInstance`]s
#[derive(Clone, Default)]
pub struct SimLauncher {
    rules: Vec<SimRule>,
    state: Arc<SimState>,
    materialize_delay: Duration,
}

impl SimLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: SimRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Yield for `delay` inside every `materialize`, while the nodes are leased
    pub fn with_materialize_delay(mut self, delay: Duration) -> Self {
        self.materialize_delay = delay;
        self
    }

    pub fn state(&self) -> Arc<SimState> {
        self.state.clone()
    }
}

#[async_trait]
impl ServiceLauncher for SimLauncher {
    async fn materialize(
        &self,
        descriptor: &ServiceDescriptor,
        nodes: &[Node],
    ) -> Result<Box<dyn ServiceInstance>, ProvisionError> {
        if !self.materialize_delay.is_zero() {
            tokio::time::sleep(self.materialize_delay).await;
        }
        let behaviors: Vec<Behavior> = self
            .rules
            .iter()
            .filter(|r| r.matches(descriptor))
            .map(|r| r.behavior.clone())
            .collect();
        let case = match descriptor.params.get(CASE_PARAM) {
            Some(ParamValue::Literal(case)) => Some(case.clone()),
            _ => None,
        };

        let id = {
            let mut instances = self.state.instances.lock();
            let id = instances.len();
            instances.push(SimInstanceInfo {
                id,
                service: descriptor.name.clone(),
                version: descriptor.version.clone(),
                case: case.clone(),
                nodes: nodes.len(),
            });
            id
        };
        self.state.acquire();

        Ok(Box::new(SimInstance {
            id,
            service: descriptor.name.clone(),
            case,
            behaviors,
            state: self.state.clone(),
            started_at: None,
            ready: false,
            released: false,
        }))
    }
}

/// One simulated service
pub struct SimInstance {
    id: usize,
    service: String,
    case: Option<String>,
    behaviors: Vec<Behavior>,
    state: Arc<SimState>,
    started_at: Option<Instant>,
    ready: bool,
    released: bool,
}

impl SimInstance {
    fn has(&self, f: impl Fn(&Behavior) -> bool) -> bool {
        self.behaviors.iter().any(f)
    }

    fn ready_after(&self) -> Duration {
        self.behaviors
            .iter()
            .find_map(|b| match b {
                Behavior::ReadyAfter(d) => Some(*d),
                _ => None,
            })
            .unwrap_or(Duration::ZERO)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.release();
        }
    }
}

#[async_trait]
impl ServiceInstance for SimInstance {
    async fn start(&mut self, _params: &Params) -> LifecycleResult<()> {
        self.state.record(self, SimCall::Start);
        if self.has(|b| matches!(b, Behavior::FailStart)) {
            return Err(LifecycleError::Startup {
                service: self.service.clone(),
                reason: "simulated start failure".to_string(),
            });
        }
        self.started_at = Some(Instant::now());
        Ok(())
    }

    async fn probe_ready(&mut self) -> LifecycleResult<bool> {
        if self.has(|b| matches!(b, Behavior::NeverReady)) {
            return Ok(false);
        }
        let Some(started) = self.started_at else {
            return Ok(false);
        };
        if started.elapsed() >= self.ready_after() {
            if !self.ready {
                self.ready = true;
                self.state.record(self, SimCall::Ready);
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        vec![Endpoint::new("sim", 10800 + self.id as u16)]
    }

    async fn run(&mut self, _entry_point: &str, _params: &Params) -> LifecycleResult<AppOutcome> {
        self.state.record(self, SimCall::Run);
        for behavior in &self.behaviors {
            if let Behavior::RunFor(d) = behavior {
                tokio::time::sleep(*d).await;
            }
        }
        if self.has(|b| matches!(b, Behavior::AppFails)) {
            return Ok(AppOutcome::Failed("simulated check failure".to_string()));
        }
        if self.has(|b| matches!(b, Behavior::AppRaises)) {
            return Ok(AppOutcome::Exception("simulated crash".to_string()));
        }
        Ok(AppOutcome::Passed)
    }

    async fn stop(&mut self) -> LifecycleResult<()> {
        self.state.record(self, SimCall::Stop);
        for behavior in &self.behaviors {
            if let Behavior::SlowStop(d) = behavior {
                tokio::time::sleep(*d).await;
            }
        }
        if self.has(|b| matches!(b, Behavior::FailStop)) {
            return Err(LifecycleError::Collaborator {
                service: self.service.clone(),
                reason: "simulated stop failure".to_string(),
            });
        }
        self.release();
        Ok(())
    }

    async fn kill(&mut self) -> LifecycleResult<()> {
        self.state.record(self, SimCall::Kill);
        self.release();
        Ok(())
    }

    fn kill_now(&mut self) {
        self.state.record(self, SimCall::Kill);
        self.release();
    }
}

impl Drop for SimInstance {
    fn drop(&mut self) {
        self.release();
    }
}
