//! compat-matrix binary
//!
//! Usage: compat-matrix [--list] [--filter <substring>] [--backend loopback|process] ...
//!
//! Exit codes:
//!   0 - Every case passed
//!   1 - At least one case did not pass
//!   2 - Usage or configuration error

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use compat_matrix::catalog;
use compat_matrix::config::HarnessConfig;
use compat_matrix::lifecycle::ServiceLauncher;
use compat_matrix::report::{EXIT_ALL_PASSED, EXIT_NOT_ALL_PASSED, EXIT_USAGE};
use compat_matrix::runner::{AbortReason, SuiteRunner};
use compat_matrix::service::{CommandTemplate, LoopbackLauncher, ProcessLauncher, ProcessLauncherConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-process servers and clients
    Loopback,
    /// Servers and applications as child processes
    Process,
}

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run version-matrixed compatibility tests")]
struct Cli {
    /// List tests and their cases, then exit
    #[arg(long)]
    list: bool,

    /// Only tests whose name contains this substring
    #[arg(long, env = "COMPAT_FILTER")]
    filter: Option<String>,

    #[arg(long, value_enum, default_value = "loopback", env = "COMPAT_BACKEND")]
    backend: Backend,

    /// Maximum concurrently running cases
    #[arg(long, env = "COMPAT_PARALLELISM")]
    parallelism: Option<usize>,

    /// Per-case limit, e.g. `300`, `90s`, `500ms`, `1m30s`
    #[arg(long, env = "COMPAT_CASE_TIMEOUT", value_parser = parse_duration)]
    case_timeout: Option<Duration>,

    #[arg(long, env = "COMPAT_STARTUP_TIMEOUT", value_parser = parse_duration)]
    startup_timeout: Option<Duration>,

    #[arg(long, env = "COMPAT_GRACE_PERIOD", value_parser = parse_duration)]
    grace_period: Option<Duration>,

    #[arg(long, env = "COMPAT_PROVISION_TIMEOUT", value_parser = parse_duration)]
    provision_timeout: Option<Duration>,

    /// Abort the whole run after this long
    #[arg(long, env = "COMPAT_SUITE_TIMEOUT", value_parser = parse_duration)]
    suite_timeout: Option<Duration>,

    /// Test-bed hosts, one node each (comma separated)
    #[arg(long, env = "COMPAT_NODES", value_delimiter = ',')]
    nodes: Vec<String>,

    /// Number of local test-bed nodes when --nodes is not given
    #[arg(long, env = "COMPAT_TESTBED_SIZE")]
    testbed_size: Option<usize>,

    /// Skip remaining cases after the first one that does not pass
    #[arg(long, env = "COMPAT_FAIL_FAST")]
    fail_fast: bool,

    /// Concrete release that `latest` stands for
    #[arg(long, env = "COMPAT_LATEST_RELEASE")]
    latest_release: Option<String>,

    /// Write the JSON report here
    #[arg(long, env = "COMPAT_REPORT")]
    report: Option<PathBuf>,

    /// Server command template (process backend)
    #[arg(long, env = "COMPAT_SERVER_CMD")]
    server_cmd: Option<String>,

    /// Client application command template (process backend)
    #[arg(long, env = "COMPAT_CLIENT_CMD")]
    client_cmd: Option<String>,

    /// Keep process work directories under this path
    #[arg(long, env = "COMPAT_WORK_DIR")]
    work_dir: Option<PathBuf>,
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::new().with_fail_fast(self.fail_fast);
        if let Some(parallelism) = self.parallelism {
            config = config.with_parallelism(parallelism);
        }
        if let Some(timeout) = self.case_timeout {
            config = config.with_case_timeout(timeout);
        }
        if let Some(timeout) = self.startup_timeout {
            config = config.with_startup_timeout(timeout);
        }
        if let Some(grace) = self.grace_period {
            config = config.with_grace_period(grace);
        }
        if let Some(timeout) = self.provision_timeout {
            config = config.with_provision_timeout(timeout);
        }
        if let Some(release) = &self.latest_release {
            config = config.with_latest_release(release.clone());
        }
        if !self.nodes.is_empty() {
            config = config.with_testbed_nodes(self.nodes.iter().cloned());
        } else if let Some(size) = self.testbed_size {
            config = config.with_testbed_size(size);
        }
        config.with_suite_timeout(self.suite_timeout)
    }

    fn launcher(&self, config: &HarnessConfig) -> Result<Arc<dyn ServiceLauncher>, String> {
        match self.backend {
            Backend::Loopback => Ok(Arc::new(LoopbackLauncher::new())),
            Backend::Process => {
                let template = |cmd: &Option<String>, flag: &str| match cmd.as_deref() {
                    None => Err(format!("--backend process requires {}", flag)),
                    Some(line) => {
                        CommandTemplate::parse(line).map_err(|e| format!("{}: {}", flag, e))
                    }
                };
                Ok(Arc::new(ProcessLauncher::new(ProcessLauncherConfig {
                    server: Some(template(&self.server_cmd, "--server-cmd")?),
                    client: Some(template(&self.client_cmd, "--client-cmd")?),
                    work_root: self.work_dir.clone(),
                    latest_release: config.latest_release.clone(),
                })))
            }
        }
    }
}

/// Bare numbers are seconds; anything else goes through humantime
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {:?}: {}", s, e))
}

fn usage_error(message: impl std::fmt::Display) -> ! {
    eprintln!("ERROR: {}", message);
    std::process::exit(EXIT_USAGE);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("compat_matrix=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let catalog = catalog::init().unwrap_or_else(|e| usage_error(e));
    let tests = catalog.select(cli.filter.as_deref());

    if cli.list {
        for test in &tests {
            let cases = test
                .case_count()
                .map_or_else(|| "too many".to_string(), |n| n.to_string());
            let nodes = test
                .num_nodes
                .map_or_else(|| "any".to_string(), |n| n.to_string());
            println!("{} ({} cases, {} nodes)", test.name, cases, nodes);
            for case in test.matrix.expand() {
                println!("  {}", case);
            }
        }
        std::process::exit(EXIT_ALL_PASSED);
    }

    if tests.is_empty() {
        usage_error(format!(
            "no test matches {:?}",
            cli.filter.as_deref().unwrap_or_default()
        ));
    }

    let config = cli.harness_config();
    if config.testbed_nodes.is_empty() {
        usage_error("test-bed needs at least one node");
    }
    let launcher = cli.launcher(&config).unwrap_or_else(|e| usage_error(e));

    let runner = SuiteRunner::new(config, launcher);
    let abort = runner.abort_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort(AbortReason::Interrupt);
        }
    });

    let report = match runner.run(&tests).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(EXIT_NOT_ALL_PASSED);
        }
    };

    print!("{}", report.render_text());

    if let Some(path) = &cli.report {
        let written = report
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("ERROR: failed to write report to {}: {}", path.display(), e);
            std::process::exit(EXIT_NOT_ALL_PASSED);
        }
    }

    std::process::exit(report.exit_code());
}
