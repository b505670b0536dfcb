use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, trace};
use tunnel_supervisor::config::ConfigLoader;
use tunnel_supervisor::dns::{NoopRule, NrptRule, RoutingRule};
use tunnel_supervisor::signal::ShutdownSignal;
use tunnel_supervisor::subprocess::SubprocessManager;
use tunnel_supervisor::TunnelService;

/// Supervise a VPN tunnel client and the DNS rule that goes with it
#[derive(Parser)]
#[command(name = "tunnel-supervisor", version)]
#[command(about = "Run a VPN tunnel client with clean logs, browser login and DNS routing", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not add or remove the DNS routing rule
    #[arg(long)]
    no_dns: bool,

    /// Path to the YAML configuration file
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose >= 2) // Show target module for -vv and above
        .with_thread_ids(cli.verbose >= 3) // Show thread IDs for -vvv
        .with_line_number(cli.verbose >= 3) // Show line numbers for -vvv
        .init();

    debug!("tunnel-supervisor started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::new(&cli.config)
        .load()
        .await
        .context("load config")?;

    let mut shutdown = ShutdownSignal::install().context("install signal handlers")?;

    let subprocess = SubprocessManager::production();
    let rule: Arc<dyn RoutingRule> = if cli.no_dns {
        Arc::new(NoopRule)
    } else {
        Arc::new(NrptRule::new(
            subprocess.runner(),
            config.dns.display_name.clone(),
        ))
    };

    let service = TunnelService::new(config, rule, subprocess.runner());
    if let Some(status) = service.run(shutdown.recv()).await? {
        debug!("Tunnel process finished with {}", status);
    }
    Ok(())
}
