//! Service descriptors
//!
//! A descriptor names one versioned service instance to provision for a test
//! case: its role, version, node count, configuration and which other
//! services must be ready before it starts.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ProvisionError;
use crate::version::Version;

/// Default thin client connector port
pub const DEFAULT_CLIENT_CONNECTOR_PORT: u16 = 10800;

/// What a service is in the test topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceRole {
    /// Cluster node(s) exposing endpoints
    Server,
    /// Application that connects to a server
    ClientApplication,
}

/// How the service gets started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartupMode {
    /// Started and awaited by the executor before the test body runs
    PreStarted,
    /// Run to completion when the test body asks for it
    InvokedDirectly,
}

/// Thin client listener settings for a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectorConfig {
    pub port: u16,
}

impl Default for ClientConnectorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CLIENT_CONNECTOR_PORT,
        }
    }
}

/// Value passed to a service in its flat parameter map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamValue {
    /// Passed through as-is
    Literal(String),
    /// Replaced by `host:port` of the named service once it is ready
    EndpointOf(String),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Literal(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Literal(s)
    }
}

/// Declaration of one versioned service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub role: ServiceRole,
    pub version: Version,
    pub node_count: usize,
    pub startup_mode: StartupMode,
    pub client_connector: Option<ClientConnectorConfig>,
    /// Entry point for directly invoked applications
    pub entry_point: Option<String>,
    pub params: BTreeMap<String, ParamValue>,
    pub depends_on: Vec<String>,
    /// Overrides the harness-wide startup timeout
    pub startup_timeout: Option<Duration>,
}

impl ServiceDescriptor {
    /// Single-node server, pre-started, with the default client connector
    pub fn server(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            role: ServiceRole::Server,
            version,
            node_count: 1,
            startup_mode: StartupMode::PreStarted,
            client_connector: Some(ClientConnectorConfig::default()),
            entry_point: None,
            params: BTreeMap::new(),
            depends_on: Vec::new(),
            startup_timeout: None,
        }
    }

    /// Single-node application invoked directly through `entry_point`
    pub fn client_application(
        name: impl Into<String>,
        version: Version,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: ServiceRole::ClientApplication,
            version,
            node_count: 1,
            startup_mode: StartupMode::InvokedDirectly,
            client_connector: None,
            entry_point: Some(entry_point.into()),
            params: BTreeMap::new(),
            depends_on: Vec::new(),
            startup_timeout: None,
        }
    }

    /// Set the node count
    pub fn with_nodes(mut self, count: usize) -> Self {
        self.node_count = count;
        self
    }

    /// Set the startup mode
    pub fn with_startup_mode(mut self, mode: StartupMode) -> Self {
        self.startup_mode = mode;
        self
    }

    /// Set or clear the client connector
    pub fn with_client_connector(mut self, connector: Option<ClientConnectorConfig>) -> Self {
        self.client_connector = connector;
        self
    }

    /// Add a literal parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a parameter resolved to another service's endpoint
    ///
    /// Also records the dependency so the service is never started first.
    pub fn with_endpoint_param(mut self, key: impl Into<String>, service: impl Into<String>) -> Self {
        let service = service.into();
        self = self.depends_on(service.clone());
        self.params.insert(key.into(), ParamValue::EndpointOf(service));
        self
    }

    /// Declare a dependency that must be ready first
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if !self.depends_on.contains(&service) {
            self.depends_on.push(service);
        }
        self
    }

    /// Override the startup timeout
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    /// Check the descriptor is self-consistent
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let invalid = |reason: &str| ProvisionError::InvalidDescriptor {
            service: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.node_count == 0 {
            return Err(invalid("node count must be at least 1"));
        }
        if self.startup_mode == StartupMode::InvokedDirectly && self.entry_point.is_none() {
            return Err(invalid("directly invoked services need an entry point"));
        }
        if self.depends_on.iter().any(|d| d == &self.name) {
            return Err(invalid("service cannot depend on itself"));
        }
        for value in self.params.values() {
            if let ParamValue::EndpointOf(target) = value {
                if !self.depends_on.contains(target) {
                    return Err(invalid("endpoint parameter must name a declared dependency"));
                }
            }
        }
        Ok(())
    }
}
