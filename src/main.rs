//! lb-failover command line.
//!
//! ```text
//! lb-failover switch <target> <config>...        apply a target to every proxy
//! lb-failover list <config>...                   live policy table
//! lb-failover patroni-monitor <config> [--dry-run]
//! lb-failover patroni-check <config> [--members]
//! ```
//!
//! Exit status is 1 only for an invalid target or configuration, or a
//! monitor that cannot start. Partial switch failures are reported, not
//! turned into a failing exit code.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;

use lb_failover::alerts::Alerter;
use lb_failover::cluster::ClusterProber;
use lb_failover::config::loader::config_name;
use lb_failover::config::validation::validate_monitor;
use lb_failover::config::watcher::ConfigWatcher;
use lb_failover::config::{load_config, ControllerConfig};
use lb_failover::lifecycle::shutdown_signal;
use lb_failover::observability::{logging, metrics};
use lb_failover::routing::SwitchTarget;
use lb_failover::switch::{PolicyCache, SwitchEngine, SwitchReport};
use lb_failover::transport::{HttpTransport, TransportError};
use lb_failover::PatroniMonitor;

#[derive(Parser)]
#[command(name = "lb-failover")]
#[command(about = "Keeps reverse-proxy routes pointed at the current database primary", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch every configured proxy to a target (first_<X>, round_robin, ip_hash)
    Switch {
        target: String,
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
    /// Show the live selection policy per proxy, server and domain
    List {
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
    /// Watch cluster primaries and switch on change until interrupted
    PatroniMonitor {
        config: PathBuf,
        /// Log intended switches without sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Probe every mapping once and print the current primary
    PatroniCheck {
        config: PathBuf,
        /// Print every cluster member, not just the primary
        #[arg(long)]
        members: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Switch { target, configs } => switch(&target, &configs).await,
        Commands::List { configs } => list(&configs).await,
        Commands::PatroniMonitor { config, dry_run } => patroni_monitor(&config, dry_run).await,
        Commands::PatroniCheck { config, members } => patroni_check(&config, members).await,
    }
}

/// Load every config, or report all failures and give up.
fn load_all(paths: &[PathBuf]) -> Option<Vec<(String, ControllerConfig)>> {
    let mut loaded = Vec::with_capacity(paths.len());
    let mut ok = true;
    for path in paths {
        match load_config(path) {
            Ok(config) => loaded.push((config_name(path), config)),
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                ok = false;
            }
        }
    }
    ok.then_some(loaded)
}

/// Logging and metrics from the first configuration.
fn init_observability(config: &ControllerConfig) {
    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

fn build_engine(config: &ControllerConfig) -> Result<SwitchEngine, TransportError> {
    let transport = HttpTransport::new(&config.http)?;
    let alerter = Alerter::from_config(&config.alerts, transport.client().clone());
    Ok(SwitchEngine::new(
        transport,
        config.switch.clone(),
        PolicyCache::new(&config.cache.root),
        alerter,
    ))
}

async fn switch(raw_target: &str, paths: &[PathBuf]) -> ExitCode {
    let target: SwitchTarget = match raw_target.parse() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(configs) = load_all(paths) else {
        return ExitCode::FAILURE;
    };
    if let Some((_, first)) = configs.first() {
        init_observability(first);
    }

    let mut engines = Vec::with_capacity(configs.len());
    for (name, config) in &configs {
        match build_engine(config) {
            Ok(engine) => engines.push((name.clone(), engine)),
            Err(e) => {
                eprintln!("Error: {}: {}", name, e);
                return ExitCode::FAILURE;
            }
        }
    }

    tracing::info!(switch_target = %target, configs = engines.len(), "Starting switch");
    let target = &target;
    let reports: Vec<(String, SwitchReport)> = join_all(
        engines
            .iter()
            .map(|(name, engine)| async move { (name.clone(), engine.run(target).await) }),
    )
    .await;

    for (name, report) in &reports {
        print_report(name, report);
    }
    ExitCode::SUCCESS
}

fn print_report(name: &str, report: &SwitchReport) {
    println!("[{}] {}", name, report.summary());
    for failure in &report.failures {
        match &failure.domain {
            Some(domain) => println!("  FAILED  {} {}: {}", failure.endpoint, domain, failure.reason),
            None => println!("  FAILED  {}: {}", failure.endpoint, failure.reason),
        }
    }
    for skipped in &report.skipped {
        println!("  skipped {}", skipped);
    }
}

async fn list(paths: &[PathBuf]) -> ExitCode {
    let Some(configs) = load_all(paths) else {
        return ExitCode::FAILURE;
    };
    if let Some((_, first)) = configs.first() {
        init_observability(first);
    }

    println!(
        "{:<16} {:<36} {:<10} {:<28} {:<14} {:<24} {}",
        "CONFIG", "ENDPOINT", "SERVER", "DOMAIN", "POLICY", "FIRST UPSTREAM", "CACHED"
    );
    for (name, config) in &configs {
        let engine = match build_engine(config) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("Error: {}: {}", name, e);
                return ExitCode::FAILURE;
            }
        };
        for row in engine.inspect().await {
            println!(
                "{:<16} {:<36} {:<10} {:<28} {:<14} {:<24} {}",
                name, row.endpoint, row.server, row.domain, row.live_policy, row.first_upstream, row.cached_policy
            );
        }
    }
    ExitCode::SUCCESS
}

fn load_monitor_config(path: &Path, dry_run: bool) -> Option<ControllerConfig> {
    match load_config(path) {
        Ok(mut config) => {
            config.monitor.dry_run |= dry_run;
            Some(config)
        }
        Err(e) => {
            eprintln!("Error: {}: {}", path.display(), e);
            None
        }
    }
}

async fn start_monitor(config: &ControllerConfig) -> Option<PatroniMonitor> {
    let monitor = match PatroniMonitor::from_config(config) {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build monitor");
            return None;
        }
    };
    match monitor.start().await {
        Ok(()) => Some(monitor),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start monitor");
            None
        }
    }
}

async fn patroni_monitor(path: &Path, dry_run: bool) -> ExitCode {
    let Some(mut config) = load_monitor_config(path, dry_run) else {
        return ExitCode::FAILURE;
    };
    init_observability(&config);

    let Some(mut monitor) = start_monitor(&config).await else {
        return ExitCode::FAILURE;
    };

    let (watcher, mut updates) = ConfigWatcher::new(path);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload unavailable");
            None
        }
    };

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(mut next) = updates.recv() => {
                next.monitor.dry_run |= dry_run;
                if let Err(errors) = validate_monitor(&next.monitor) {
                    for e in errors {
                        tracing::error!(error = %e, "Reloaded monitor config rejected");
                    }
                    continue;
                }

                tracing::info!("Restarting monitor with reloaded configuration");
                monitor.stop().await;
                match start_monitor(&next).await {
                    Some(fresh) => {
                        monitor = fresh;
                        config = next;
                    }
                    None => match start_monitor(&config).await {
                        Some(previous) => monitor = previous,
                        None => {
                            tracing::error!("Monitor could not be restarted");
                            return ExitCode::FAILURE;
                        }
                    },
                }
            }
        }
    }

    monitor.stop().await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

async fn patroni_check(path: &Path, members: bool) -> ExitCode {
    let config = match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    init_observability(&config);

    if config.monitor.mappings.is_empty() {
        eprintln!("Error: {}: no cluster mappings configured", path.display());
        return ExitCode::FAILURE;
    }

    let transport = match HttpTransport::new(&config.http) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let prober = ClusterProber::new(transport.client().clone());

    for mapping in &config.monitor.mappings {
        match prober.probe_status(mapping).await {
            Ok(status) => {
                match status.leader() {
                    Some(leader) => println!("{}: primary {}", mapping.cluster_name, leader.name),
                    None => println!("{}: no primary reported", mapping.cluster_name),
                }
                if members {
                    for member in &status.members {
                        println!(
                            "  {:<16} {:<10} {:<10} {}:{} timeline={} lag={}{}",
                            member.name,
                            member.role,
                            member.state,
                            member.host,
                            member.port,
                            member.timeline.map_or_else(|| "-".to_string(), |t| t.to_string()),
                            member.lag.map_or_else(|| "-".to_string(), |l| l.to_string()),
                            if member.is_running() { "" } else { "  (not running)" },
                        );
                    }
                }
            }
            Err(e) => println!("{}: {}", mapping.cluster_name, e),
        }
    }
    ExitCode::SUCCESS
}
