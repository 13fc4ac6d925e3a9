//! Service lifecycle management
//!
//! Provisions versioned service instances on test-bed nodes, starts them in
//! dependency order, waits for readiness and guarantees teardown.
//!
//! - `descriptor`: what to provision
//! - `nodes`: the shared, finite pool of test-bed nodes
//! - `traits`: the collaborator boundary (launchers and instances)
//! - `controller`: per-case orchestration

pub mod controller;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod nodes;
pub mod traits;

pub use controller::{EventKind, LifecycleController, LifecycleEvent, LifecycleSettings, ReadySignal};
pub use descriptor::{
    ClientConnectorConfig, ParamValue, ServiceDescriptor, ServiceRole, StartupMode,
    DEFAULT_CLIENT_CONNECTOR_PORT,
};
pub use error::{LifecycleError, LifecycleResult, ProvisionError, TeardownWarning};
pub use handle::{HandleId, HandleState};
pub use nodes::{Node, NodeLease, NodePool};
pub use traits::{AppOutcome, Endpoint, Params, ServiceInstance, ServiceLauncher, CONNECTION_PARAM};
