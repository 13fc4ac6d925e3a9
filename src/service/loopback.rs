//! In-process loopback collaborators
//!
//! Server nodes are TCP listeners on 127.0.0.1 with an accept loop that runs
//! until shut down. Client applications connect to the endpoint passed in
//! their parameters, announce their version and expect the server to accept
//! it. Listeners bind ephemeral ports so concurrent cases never collide; the
//! configured client connector port is not used here.
//!
//! Handshake (one line each way):
//! - client: `HELLO <client_version>`
//! - server: `WELCOME <server_version>` or `REJECT <server_version>`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::lifecycle::{
    AppOutcome, Endpoint, LifecycleError, LifecycleResult, Node, Params, ProvisionError,
    ServiceDescriptor, ServiceInstance, ServiceLauncher, ServiceRole, CONNECTION_PARAM,
};
use crate::version::Version;

const LOOPBACK_HOST: &str = "127.0.0.1";
/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Decides whether a server version accepts a client version
pub type CompatibilityCheck = Arc<dyn Fn(&Version, &Version) -> bool + Send + Sync>;

/// Launcher for in-process servers and client applications
#[derive(Clone)]
pub struct LoopbackLauncher {
    check: CompatibilityCheck,
    startup_delay: Duration,
}

impl LoopbackLauncher {
    /// Launcher whose servers accept every client version
    pub fn new() -> Self {
        Self {
            check: Arc::new(|_, _| true),
            startup_delay: Duration::ZERO,
        }
    }

    /// Use `check(server, client)` to accept or reject clients
    pub fn with_compatibility<F>(mut self, check: F) -> Self
    where
        F: Fn(&Version, &Version) -> bool + Send + Sync + 'static,
    {
        self.check = Arc::new(check);
        self
    }

    /// Delay before server listeners bind
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }
}

impl Default for LoopbackLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceLauncher for LoopbackLauncher {
    async fn materialize(
        &self,
        descriptor: &ServiceDescriptor,
        nodes: &[Node],
    ) -> Result<Box<dyn ServiceInstance>, ProvisionError> {
        match descriptor.role {
            ServiceRole::Server => Ok(Box::new(LoopbackServer {
                name: descriptor.name.clone(),
                version: descriptor.version.clone(),
                node_count: nodes.len(),
                check: self.check.clone(),
                startup_delay: self.startup_delay,
                bound: Arc::new(Mutex::new(Vec::new())),
                nodes: Vec::new(),
            })),
            ServiceRole::ClientApplication => Ok(Box::new(LoopbackClient {
                name: descriptor.name.clone(),
                version: descriptor.version.clone(),
            })),
        }
    }
}

/// Accept loop state for one server node
struct NodeTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// In-process server: one listener per node
pub struct LoopbackServer {
    name: String,
    version: Version,
    node_count: usize,
    check: CompatibilityCheck,
    startup_delay: Duration,
    bound: Arc<Mutex<Vec<SocketAddr>>>,
    nodes: Vec<NodeTask>,
}

impl LoopbackServer {
    fn abort_all(&mut self) {
        for node in self.nodes.drain(..) {
            node.task.abort();
        }
    }
}

#[async_trait]
impl ServiceInstance for LoopbackServer {
    async fn start(&mut self, _params: &Params) -> LifecycleResult<()> {
        for _ in 0..self.node_count {
            let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
            let bound = self.bound.clone();
            let check = self.check.clone();
            let version = self.version.clone();
            let delay = self.startup_delay;
            let name = self.name.clone();

            let task = tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = &mut shutdown_rx => return,
                    }
                }
                let listener = match TcpListener::bind((LOOPBACK_HOST, 0)).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!(service = %name, error = %e, "Loopback bind failed");
                        return;
                    }
                };
                if let Ok(addr) = listener.local_addr() {
                    tracing::debug!(service = %name, %addr, "Loopback node listening");
                    bound.lock().push(addr);
                }
                serve(listener, version, check, shutdown_rx).await;
            });
            self.nodes.push(NodeTask {
                shutdown_tx: Some(shutdown_tx),
                task,
            });
        }
        Ok(())
    }

    async fn probe_ready(&mut self) -> LifecycleResult<bool> {
        if self.nodes.iter().any(|n| n.task.is_finished()) {
            return Err(LifecycleError::Startup {
                service: self.name.clone(),
                reason: "listener exited during startup".to_string(),
            });
        }
        Ok(self.bound.lock().len() == self.node_count)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.bound
            .lock()
            .iter()
            .map(|addr| Endpoint::new(addr.ip().to_string(), addr.port()))
            .collect()
    }

    async fn stop(&mut self) -> LifecycleResult<()> {
        for node in &mut self.nodes {
            if let Some(tx) = node.shutdown_tx.take() {
                let _ = tx.send(());
            }
        }
        for node in self.nodes.drain(..) {
            let _ = node.task.await;
        }
        self.bound.lock().clear();
        Ok(())
    }

    async fn kill(&mut self) -> LifecycleResult<()> {
        self.abort_all();
        Ok(())
    }

    fn kill_now(&mut self) {
        self.abort_all();
    }
}

/// Accept connections until shutdown
async fn serve(
    listener: TcpListener,
    version: Version,
    check: CompatibilityCheck,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Loopback accept failed");
                        if accept_backoff(&mut shutdown_rx).await {
                            continue;
                        }
                        break;
                    }
                };
                let version = version.clone();
                let check = check.clone();
                tokio::spawn(async move {
                    if let Err(e) = handshake(stream, &version, &check).await {
                        tracing::debug!(%peer, error = %e, "Loopback handshake aborted");
                    }
                });
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Loopback node shutting down");
                break;
            }
        }
    }
}

/// Wait out [`ACCEPT_BACKOFF`]; `false` if shutdown arrived first
async fn accept_backoff(shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
        _ = shutdown_rx => false,
    }
}

async fn handshake(
    stream: TcpStream,
    version: &Version,
    check: &CompatibilityCheck,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await?;

    let reply = match line.trim().strip_prefix("HELLO ") {
        Some(client) => match client.parse::<Version>() {
            Ok(client) if check(version, &client) => format!("WELCOME {}\n", version),
            _ => format!("REJECT {}\n", version),
        },
        None => format!("REJECT {}\n", version),
    };
    write.write_all(reply.as_bytes()).await?;
    write.shutdown().await
}

/// In-process client application
pub struct LoopbackClient {
    name: String,
    version: Version,
}

#[async_trait]
impl ServiceInstance for LoopbackClient {
    async fn start(&mut self, _params: &Params) -> LifecycleResult<()> {
        Ok(())
    }

    async fn probe_ready(&mut self) -> LifecycleResult<bool> {
        Ok(true)
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        Vec::new()
    }

    async fn run(&mut self, entry_point: &str, params: &Params) -> LifecycleResult<AppOutcome> {
        let Some(target) = params.get(CONNECTION_PARAM) else {
            return Ok(AppOutcome::Exception(format!(
                "missing parameter {}",
                CONNECTION_PARAM
            )));
        };
        tracing::debug!(service = %self.name, %entry_point, %target, "Loopback client connecting");

        let stream = match TcpStream::connect(target.as_str()).await {
            Ok(stream) => stream,
            Err(e) => {
                return Ok(AppOutcome::Exception(format!(
                    "connect to {} failed: {}",
                    target, e
                )))
            }
        };
        let (read, mut write) = stream.into_split();
        write
            .write_all(format!("HELLO {}\n", self.version).as_bytes())
            .await?;

        let mut reply = String::new();
        BufReader::new(read).read_line(&mut reply).await?;
        let reply = reply.trim();

        Ok(if let Some(server) = reply.strip_prefix("WELCOME ") {
            tracing::debug!(service = %self.name, %server, "Loopback client accepted");
            AppOutcome::Passed
        } else if let Some(server) = reply.strip_prefix("REJECT ") {
            AppOutcome::Failed(format!(
                "server {} rejected client {}",
                server, self.version
            ))
        } else {
            AppOutcome::Exception(format!("unexpected reply: {:?}", reply))
        })
    }

    async fn stop(&mut self) -> LifecycleResult<()> {
        Ok(())
    }
}
