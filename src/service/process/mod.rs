//! Subprocess collaborators
//!
//! Each service node is a child process rendered from a [`CommandTemplate`].
//! Servers are ready once every node accepts TCP connections on its client
//! connector port offset by the node id, so node `n` of the test-bed
//! listens on `port + n`. Node ids are unique across the pool, which keeps
//! services of concurrent cases on distinct ports. Directly
//! invoked applications run once on their first node and their exit status
//! decides the outcome: 0 passed, 1 failed, anything else an exception.
//! Parameters are appended to the command line as `key=value` arguments.

mod reaper;
pub mod template;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::lifecycle::{
    AppOutcome, Endpoint, LifecycleError, LifecycleResult, Node, Params, ProvisionError,
    ServiceDescriptor, ServiceInstance, ServiceLauncher, ServiceRole,
};

use self::reaper::Signal;
pub use self::template::{CommandTemplate, TemplateError, TemplateVars};

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const STDERR_TAIL_LINES: usize = 5;

/// Templates and filesystem layout for subprocess services
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncherConfig {
    /// Command for server nodes
    pub server: Option<CommandTemplate>,
    /// Command for client applications
    pub client: Option<CommandTemplate>,
    /// Parent of per-service work directories; kept after the run when set
    pub work_root: Option<PathBuf>,
    /// Release substituted for `latest`
    pub latest_release: Option<String>,
}

/// Launches services as child processes
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: ProcessLauncherConfig,
}

impl ProcessLauncher {
    pub fn new(config: ProcessLauncherConfig) -> Self {
        Self { config }
    }

    fn work_dir(&self, service: &str) -> std::io::Result<TempDir> {
        let prefix = format!("{}-", service);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.config.work_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.keep(true).tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

#[async_trait]
impl ServiceLauncher for ProcessLauncher {
    async fn materialize(
        &self,
        descriptor: &ServiceDescriptor,
        nodes: &[Node],
    ) -> Result<Box<dyn ServiceInstance>, ProvisionError> {
        let version = descriptor
            .version
            .resolve(self.config.latest_release.as_deref());
        let template = match descriptor.role {
            ServiceRole::Server => self.config.server.clone(),
            ServiceRole::ClientApplication => self.config.client.clone(),
        };
        let Some(template) = template else {
            return Err(ProvisionError::Unsupported {
                service: descriptor.name.clone(),
                version: version.to_string(),
                reason: format!("no command configured for {:?} services", descriptor.role),
            });
        };

        let work_dir = self
            .work_dir(&descriptor.name)
            .map_err(|e| ProvisionError::Unsupported {
                service: descriptor.name.clone(),
                version: version.to_string(),
                reason: format!("cannot create work directory: {}", e),
            })?;

        tracing::debug!(
            service = %descriptor.name,
            work_dir = %work_dir.path().display(),
            "Materialized process service"
        );

        Ok(Box::new(ProcessInstance {
            name: descriptor.name.clone(),
            role: descriptor.role,
            version: version.to_string(),
            template,
            nodes: nodes.to_vec(),
            base_port: descriptor.client_connector.map(|c| c.port),
            work_dir,
            children: Vec::new(),
            logs: Vec::new(),
        }))
    }
}

/// A spawned child and the pid registered with the reaper
struct Spawned {
    child: Child,
    pid: Option<u32>,
}

impl Spawned {
    fn forget(&mut self) {
        if let Some(pid) = self.pid.take() {
            reaper::forget(pid);
        }
    }
}

/// One service backed by child processes
pub struct ProcessInstance {
    name: String,
    role: ServiceRole,
    version: String,
    template: CommandTemplate,
    nodes: Vec<Node>,
    base_port: Option<u16>,
    work_dir: TempDir,
    children: Vec<Spawned>,
    logs: Vec<PathBuf>,
}

impl ProcessInstance {
    fn port(&self, node: &Node) -> Option<u16> {
        self.base_port
            .and_then(|p| p.checked_add(u16::try_from(node.id).ok()?))
    }

    fn spawn(
        &mut self,
        index: usize,
        entry_point: Option<&str>,
        params: &Params,
    ) -> LifecycleResult<()> {
        let node = &self.nodes[index];
        let vars = TemplateVars {
            version: &self.version,
            port: self.port(node),
            node: node.id,
            host: &node.host,
            entry_point,
            work_dir: Some(self.work_dir.path()),
        };
        let (program, args) = self.template.render(&vars);

        let stdout_path = self.work_dir.path().join(format!("{}-{}.out", self.name, index));
        let stderr_path = self.work_dir.path().join(format!("{}-{}.err", self.name, index));
        let stdout = std::fs::File::create(&stdout_path)?;
        let stderr = std::fs::File::create(&stderr_path)?;

        tracing::debug!(service = %self.name, %program, ?args, node = %node, "Spawning process");

        let child = Command::new(&program)
            .args(&args)
            .args(params.iter().map(|(k, v)| format!("{}={}", k, v)))
            .current_dir(self.work_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LifecycleError::Startup {
                service: self.name.clone(),
                reason: format!("failed to spawn {}: {}", program, e),
            })?;

        let pid = child.id();
        if let Some(pid) = pid {
            reaper::track(pid);
        }
        self.logs.push(stdout_path);
        self.logs.push(stderr_path);
        self.children.push(Spawned { child, pid });
        Ok(())
    }

    fn stderr_tail(&self, index: usize) -> String {
        let path = self.work_dir.path().join(format!("{}-{}.err", self.name, index));
        tail(&path, STDERR_TAIL_LINES)
    }
}

fn tail(path: &Path, lines: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let all: Vec<&str> = content.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => format!("terminated by signal ({})", status),
    }
}

#[async_trait]
impl ServiceInstance for ProcessInstance {
    async fn start(&mut self, params: &Params) -> LifecycleResult<()> {
        for index in 0..self.nodes.len() {
            self.spawn(index, None, params)?;
        }
        Ok(())
    }

    async fn probe_ready(&mut self) -> LifecycleResult<bool> {
        let mut exited = None;
        for (index, spawned) in self.children.iter_mut().enumerate() {
            if let Some(status) = spawned.child.try_wait()? {
                spawned.forget();
                exited = Some((index, status));
                break;
            }
        }
        if let Some((index, status)) = exited {
            let reason = format!("node {} exited during startup: {}", index, describe_exit(status));
            let tail = self.stderr_tail(index);
            return Err(LifecycleError::Startup {
                service: self.name.clone(),
                reason: if tail.is_empty() {
                    reason
                } else {
                    format!("{}: {}", reason, tail)
                },
            });
        }

        for endpoint in self.endpoints() {
            let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
            match tokio::time::timeout(PROBE_CONNECT_TIMEOUT, connect).await {
                Ok(Ok(_)) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        if self.role != ServiceRole::Server {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter_map(|node| Some(Endpoint::new(node.host.clone(), self.port(node)?)))
            .collect()
    }

    async fn run(&mut self, entry_point: &str, params: &Params) -> LifecycleResult<AppOutcome> {
        let index = self.children.len();
        if index >= self.nodes.len() {
            return Err(LifecycleError::InvalidTransition {
                service: self.name.clone(),
                action: "run",
                state: "exhausted",
            });
        }
        self.spawn(index, Some(entry_point), params)?;

        let spawned = &mut self.children[index];
        let status = spawned.child.wait().await?;
        spawned.forget();

        let tail = self.stderr_tail(index);
        let detail = |what: String| {
            if tail.is_empty() {
                what
            } else {
                format!("{}: {}", what, tail)
            }
        };
        Ok(match status.code() {
            Some(0) => AppOutcome::Passed,
            Some(1) => AppOutcome::Failed(detail(describe_exit(status))),
            _ => AppOutcome::Exception(detail(describe_exit(status))),
        })
    }

    async fn stop(&mut self) -> LifecycleResult<()> {
        for spawned in &self.children {
            if let Some(pid) = spawned.pid {
                reaper::signal(pid, Signal::Terminate);
            }
        }
        for spawned in &mut self.children {
            let status = spawned.child.wait().await?;
            spawned.forget();
            tracing::debug!(service = %self.name, status = %describe_exit(status), "Process exited");
        }
        Ok(())
    }

    async fn kill(&mut self) -> LifecycleResult<()> {
        for spawned in &mut self.children {
            // Already-exited children report an error here; nothing to do
            let _ = spawned.child.kill().await;
            spawned.forget();
        }
        Ok(())
    }

    fn kill_now(&mut self) {
        for spawned in &mut self.children {
            let _ = spawned.child.start_kill();
            spawned.forget();
        }
    }

    fn log_paths(&self) -> Vec<PathBuf> {
        self.logs.clone()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lifecycle::NodePool;
    use crate::version::Version;

    fn nodes(n: usize) -> Vec<Node> {
        let pool = Arc::new(NodePool::new((0..n).map(|_| "127.0.0.1")));
        pool.try_acquire(n).unwrap().nodes().to_vec()
    }

    fn launcher(client: &str) -> ProcessLauncher {
        ProcessLauncher::new(ProcessLauncherConfig {
            server: Some(CommandTemplate::new("sleep", ["30"])),
            client: Some(CommandTemplate::new("sh", ["-c", client])),
            ..Default::default()
        })
    }

    async fn run_app(script: &str) -> AppOutcome {
        let descriptor = ServiceDescriptor::client_application("app", Version::Dev, "Main");
        let mut app = launcher(script)
            .materialize(&descriptor, &nodes(1))
            .await
            .unwrap();
        app.run("Main", &Params::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_exit_status_maps_to_outcome() {
        assert_eq!(run_app("exit 0").await, AppOutcome::Passed);
        assert!(matches!(run_app("echo boom >&2; exit 1").await, AppOutcome::Failed(r) if r.contains("boom")));
        assert!(matches!(run_app("exit 3").await, AppOutcome::Exception(_)));
    }

    #[tokio::test]
    async fn test_missing_template_is_unsupported() {
        let launcher = ProcessLauncher::new(ProcessLauncherConfig::default());
        let descriptor = ServiceDescriptor::server("srv", Version::Dev);
        let err = launcher.materialize(&descriptor, &nodes(1)).await.err().unwrap();
        assert!(matches!(err, ProvisionError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_server_endpoints_follow_connector_port() {
        let descriptor = ServiceDescriptor::server("srv", Version::Dev).with_nodes(2);
        let server = launcher("true")
            .materialize(&descriptor, &nodes(2))
            .await
            .unwrap();
        let ports: Vec<u16> = server.endpoints().iter().map(|e| e.port).collect();
        assert_eq!(ports, vec![10800, 10801]);
    }

    #[tokio::test]
    async fn test_concurrent_servers_get_distinct_ports() {
        let pool = Arc::new(NodePool::new(vec!["127.0.0.1"; 4]));
        let first = pool.try_acquire(1).unwrap();
        let second = pool.try_acquire(1).unwrap();

        let launcher = launcher("true");
        let descriptor = ServiceDescriptor::server("srv", Version::Dev);
        let a = launcher.materialize(&descriptor, first.nodes()).await.unwrap();
        let b = launcher.materialize(&descriptor, second.nodes()).await.unwrap();

        assert_eq!(a.endpoints()[0].port, 10800);
        assert_eq!(b.endpoints()[0].port, 10801);
        assert_ne!(a.endpoints(), b.endpoints());
    }

    #[tokio::test]
    async fn test_stop_terminates_children() {
        let descriptor = ServiceDescriptor::server("srv", Version::Dev);
        let mut server = launcher("true")
            .materialize(&descriptor, &nodes(1))
            .await
            .unwrap();
        server.start(&Params::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), server.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.log_paths().len(), 2);
    }
}
