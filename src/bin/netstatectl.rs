//! netstatectl - Declarative Network State CLI
//!
//! Applies desired-state documents to network interfaces through
//! NetworkManager and verifies that the applied configuration converges.
//!
//! # Usage
//!
//! ```bash
//! # Show the applied IPv4 state of an interface
//! netstatectl show eth1
//!
//! # Show the on-disk profile instead of the applied state
//! netstatectl show eth1 --saved
//!
//! # Apply a desired state document and wait for convergence
//! sudo netstatectl apply desired.json
//!
//! # Only check whether the system already matches a document
//! netstatectl verify desired.json --timeout 5
//! ```

use clap::{Parser, Subcommand};
use libnetstate::{
    ApplyOptions, NetstateConfig, NetstateManager, NetstateResult, NetworkState, RetryBudget,
};
use std::path::PathBuf;
use std::process;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Declarative network state tool
#[derive(Parser, Debug)]
#[command(name = "netstatectl")]
#[command(author = "netstate contributors")]
#[command(version)]
#[command(about = "Declarative IPv4 network state management via NetworkManager", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file (defaults to /etc/netstate/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show interface state as JSON
    Show {
        /// Interface name (all interfaces when omitted)
        interface: Option<String>,

        /// Show the saved profile instead of the applied state
        #[arg(long)]
        saved: bool,
    },
    /// Apply a desired state document
    Apply {
        /// JSON desired state document
        state_file: PathBuf,

        /// Do not wait for convergence after submitting changes
        #[arg(long)]
        no_verify: bool,

        /// Verification timeout in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not watch link stability during the change
        #[arg(long)]
        no_link_watch: bool,
    },
    /// Check whether the system matches a desired state document
    Verify {
        /// JSON desired state document
        state_file: PathBuf,

        /// Verification timeout in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> NetstateResult<()> {
    let config = match &cli.config {
        Some(path) => NetstateConfig::load(path)?,
        None => NetstateConfig::load_or_default(NetstateConfig::DEFAULT_PATH)?,
    };

    let manager = NetstateManager::with_system_backend(&config);

    match cli.command {
        Commands::Show { interface, saved } => {
            let interfaces = match interface {
                Some(name) => vec![manager.show(&name, saved).await?],
                None => {
                    let mut states = Vec::new();
                    for name in manager.list().await? {
                        match manager.show(&name, saved).await {
                            Ok(state) => states.push(state),
                            Err(e) => warn!("Skipping {}: {}", name, e),
                        }
                    }
                    states
                }
            };
            let state = NetworkState { interfaces };
            println!("{}", serde_json::to_string_pretty(&state)?);
        }

        Commands::Apply {
            state_file,
            no_verify,
            timeout,
            no_link_watch,
        } => {
            warn_if_not_root();

            let desired = NetworkState::from_file(&state_file).await?;
            let options = ApplyOptions {
                verify: !no_verify,
                budget: budget_for(timeout, &config),
                watch_link: !no_link_watch,
            };

            let report = manager.apply(&desired, &options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Verify {
            state_file,
            timeout,
        } => {
            let desired = NetworkState::from_file(&state_file).await?;
            manager.verify(&desired, budget_for(timeout, &config)).await?;
            info!("Desired state verified");
        }
    }

    Ok(())
}

fn budget_for(timeout_secs: Option<u64>, config: &NetstateConfig) -> RetryBudget {
    match timeout_secs {
        Some(secs) => RetryBudget::from_secs(secs)
            .with_interval(config.retry_budget().interval()),
        None => config.retry_budget(),
    }
}

fn warn_if_not_root() {
    #[cfg(target_os = "linux")]
    {
        let uid = unsafe { libc::getuid() };
        if uid != 0 {
            warn!("Not running as root - applying changes may fail");
            warn!("Consider running with sudo");
        }
    }
}

/// Initialize logging based on command-line arguments
fn init_logging(cli: &Cli) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "netstatectl={},libnetstate={}",
            log_level, log_level
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}
