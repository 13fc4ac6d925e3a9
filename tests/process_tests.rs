//! Process backend through the lifecycle controller
//!
//! Uses `sh` and `sleep` as stand-in services. Readiness needs a listener on
//! the client connector port, which the tests provide themselves.

#![cfg(unix)]

mod test_utils;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use compat_matrix::lifecycle::{
    AppOutcome, ClientConnectorConfig, HandleState, LifecycleError, ServiceDescriptor,
};
use compat_matrix::service::{CommandTemplate, ProcessLauncher, ProcessLauncherConfig};
use compat_matrix::version::Version;

use test_utils::{controller, fast_settings, init_tracing};

const CONNECTION_PARAM: &str = "connection";

fn launcher(server: CommandTemplate, client_script: &str) -> Arc<ProcessLauncher> {
    Arc::new(ProcessLauncher::new(ProcessLauncherConfig {
        server: Some(server),
        client: Some(CommandTemplate::new("sh", ["-c", client_script, "app"])),
        ..Default::default()
    }))
}

fn server_on(port: u16) -> ServiceDescriptor {
    ServiceDescriptor::server("server", Version::Dev)
        .with_client_connector(Some(ClientConnectorConfig { port }))
}

fn client() -> ServiceDescriptor {
    ServiceDescriptor::client_application("client", Version::Latest, "Main")
        .with_endpoint_param(CONNECTION_PARAM, "server")
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_client_receives_server_endpoint() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Passes only if $1 is the resolved endpoint parameter
    let script = format!(
        "test \"$1\" = \"{}=127.0.0.1:{}\" || {{ echo \"got $1\" >&2; exit 1; }}",
        CONNECTION_PARAM, port
    );
    let launcher = launcher(CommandTemplate::new("sleep", ["30"]), &script);
    let (mut ctl, pool) = controller(2, launcher, fast_settings());

    let server_id = ctl.provision(server_on(port)).await.unwrap();
    let client_id = ctl.provision(client()).await.unwrap();
    ctl.start_pre_started().await.unwrap();
    assert_eq!(ctl.state(server_id).unwrap(), HandleState::Ready);

    assert_eq!(ctl.run(client_id).await.unwrap(), AppOutcome::Passed);

    let logs = ctl.log_paths();
    assert_eq!(logs.len(), 4);
    assert!(logs.iter().all(|p| p.exists()));

    // sleep exits on SIGTERM well within the grace period
    assert!(ctl.teardown().await.is_empty());
    assert_eq!(pool.in_use(), 0);
}

#[tokio::test]
async fn test_server_without_listener_times_out() {
    let port = closed_port().await;
    let launcher = launcher(CommandTemplate::new("sleep", ["30"]), "exit 0");
    let mut settings = fast_settings();
    settings.startup_timeout = Duration::from_millis(300);
    let (mut ctl, _pool) = controller(1, launcher, settings);

    let id = ctl.provision(server_on(port)).await.unwrap();
    let err = ctl.start(id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::StartupTimeout { .. }));

    assert!(ctl.teardown().await.is_empty());
}

#[tokio::test]
async fn test_server_exiting_during_startup() {
    let port = closed_port().await;
    let server = CommandTemplate::new("sh", ["-c", "echo no license >&2; exit 7"]);
    let launcher = launcher(server, "exit 0");
    let (mut ctl, _pool) = controller(1, launcher, fast_settings());

    let id = ctl.provision(server_on(port)).await.unwrap();
    let err = ctl.start(id).await.unwrap_err();
    match err {
        LifecycleError::Startup { reason, .. } => {
            assert!(reason.contains("exit code 7"), "{}", reason);
            assert!(reason.contains("no license"), "{}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(ctl.teardown().await.is_empty());
}

#[tokio::test]
async fn test_server_ignoring_sigterm_is_killed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = CommandTemplate::new("sh", ["-c", "trap '' TERM; exec sleep 30"]);
    let launcher = launcher(server, "exit 0");
    let mut settings = fast_settings();
    settings.grace_period = Duration::from_millis(200);
    let (mut ctl, pool) = controller(1, launcher, settings);

    let id = ctl.provision(server_on(port)).await.unwrap();
    ctl.start(id).await.unwrap();
    // Let the shell install its trap before teardown signals it
    tokio::time::sleep(Duration::from_millis(200)).await;

    let began = Instant::now();
    let warnings = ctl.teardown().await;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("did not stop"));
    assert!(began.elapsed() < Duration::from_secs(5));
    assert_eq!(ctl.state(id).unwrap(), HandleState::Stopped);
    assert_eq!(pool.in_use(), 0);
    drop(listener);
}

#[tokio::test]
async fn test_latest_resolves_to_configured_release() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // The client checks its rendered version argument
    let launcher = Arc::new(ProcessLauncher::new(ProcessLauncherConfig {
        server: Some(CommandTemplate::new("sleep", ["30"])),
        client: Some(CommandTemplate::new(
            "sh",
            ["-c", "test \"$1\" = 2.16.0", "app", "{version}"],
        )),
        latest_release: Some("2.16.0".to_string()),
        ..Default::default()
    }));
    let (mut ctl, _pool) = controller(2, launcher, fast_settings());

    ctl.provision(server_on(port)).await.unwrap();
    let client_id = ctl.provision(client()).await.unwrap();
    ctl.start_pre_started().await.unwrap();
    assert_eq!(ctl.run(client_id).await.unwrap(), AppOutcome::Passed);

    ctl.teardown().await;
}
