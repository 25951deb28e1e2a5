//! vmgate daemon entry point.
//!
//! Runs the privileged API service mediating between an unprivileged
//! orchestrator and the installed VMware desktop hypervisor.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vmgate_driver::{create_driver, DriverOptions};
use vmgate_server::ApiServer;
use vmgate_utility::shutdown::run_shutdown_tasks;

use crate::config::Config;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "vmgate")]
#[command(version, about = "VMware desktop networking control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the vmgate API service.
    Api(ApiArgs),
}

#[derive(Debug, clap::Args)]
struct ApiArgs {
    /// Port for the API to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Driver to use (simple, advanced, or vmrest).
    #[arg(long)]
    driver: Option<String>,

    /// Override VMware license detection (standard or professional).
    #[arg(long = "license-override")]
    license_override: Option<String>,

    /// Use the internal port forwarding implementation.
    #[arg(long = "internal-port-forwarding")]
    internal_port_forwarding: bool,

    /// Configuration file path.
    #[arg(long = "config-file")]
    config_file: Option<PathBuf>,

    /// Log output file path.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    level: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Api(args) => run_api(args),
    };
    if let Err(err) = outcome {
        eprintln!("vmgate: {err:#}");
        std::process::exit(1);
    }
}

fn run_api(args: ApiArgs) -> Result<()> {
    let mut config = Config::load(args.config_file.as_deref())
        .context("failed to load configuration")?;

    // CLI flags win over environment and file settings.
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(driver) = args.driver {
        config.api.driver = driver;
    }
    if let Some(license) = args.license_override {
        config.api.license_override = license;
    }
    if args.internal_port_forwarding {
        config.api.internal_port_forwarding = true;
    }
    if let Some(log_file) = args.log_file {
        config.core.log_file = Some(log_file);
    }
    if args.debug {
        config.core.debug = true;
    }
    if let Some(level) = args.level {
        config.core.level = level;
    }

    init_logging(&config)?;

    tokio::runtime::Runtime::new()
        .context("failed to start async runtime")?
        .block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    info!(version = VERSION, "starting vmgate api service");
    let cancel = CancellationToken::new();

    let options = DriverOptions {
        driver: if config.api.driver.is_empty() {
            None
        } else {
            Some(config.api.driver.clone())
        },
        license_override: if config.api.license_override.is_empty() {
            None
        } else {
            Some(config.api.license_override.clone())
        },
        internal_port_forwarding: config.api.internal_port_forwarding,
    };
    let driver = create_driver(&options, cancel.clone())
        .await
        .context("failed to setup VMware driver")?;
    let driver: Arc<dyn vmgate_driver::Driver> = Arc::from(driver);

    if !driver.validate().await {
        // The service still starts so the orchestrator can talk to it;
        // every routed request reports the validation failure.
        tracing::error!("vmware validation failed");
    }

    // The API always binds loopback only.
    let server = ApiServer::new("127.0.0.1", config.api.port, VERSION, Arc::clone(&driver));
    let handle = server
        .start()
        .await
        .context("failed to start the vmgate API service")?;

    shutdown_signal().await;
    info!("shutdown signal received");

    run_shutdown_tasks();
    cancel.cancel();
    handle.stop().await;

    info!("vmgate api service stopped");
    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let level = if config.core.debug {
        "debug".to_string()
    } else {
        config.core.level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match &config.core.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(config.core.log_append)
                .truncate(!config.core.log_append)
                .write(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .init();
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
