//! Screen Watch CLI
//!
//! `run` watches the screen in the foreground until Ctrl-C; `serve` exposes
//! start/stop/status over HTTP.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use screen_watch::config::{Environment, WatchConfig};
use screen_watch::monitoring::MonitorSupervisor;
use screen_watch::notifications::{LogNotifier, NotificationCenter};
use screen_watch::server::{ServerState, WatchServer};

#[derive(Parser)]
#[command(name = "screen-watch")]
#[command(about = "Watch a screen region and get notified when it changes")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/screen-watch/config.toml)
    #[arg(short, long, env = "SCREEN_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor in the foreground until Ctrl-C
    Run {
        /// Milliseconds between captures
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Use generated frames instead of the real screen
        #[arg(long)]
        synthetic: bool,
    },

    /// Serve the HTTP control API
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    screen_watch::init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = WatchConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            interval_ms,
            synthetic,
        } => {
            if let Some(ms) = interval_ms {
                config.monitor.interval_ms = ms;
            }
            if synthetic && config.environment == Environment::Production {
                config.environment = Environment::Development;
            }
            run_foreground(config).await
        }
        Commands::Serve { host, port } => {
            config.server = config.server.with_overrides(host, port);
            serve(config).await
        }
    }
}

async fn run_foreground(config: WatchConfig) -> anyhow::Result<()> {
    let mut monitor = screen_watch::build_monitor(&config, Arc::new(LogNotifier))?;
    let handle = monitor.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping");
            handle.stop();
        }
    });

    monitor.start().await?;

    let status = monitor.status();
    info!(
        "Finished after {} iterations ({} changes, {} failed)",
        status.iterations, status.changes_detected, status.failed_iterations
    );
    Ok(())
}

async fn serve(config: WatchConfig) -> anyhow::Result<()> {
    let notifications = Arc::new(NotificationCenter::new());
    let monitor = screen_watch::build_monitor(&config, notifications.clone())?;
    let state = ServerState::new(MonitorSupervisor::new(monitor), notifications);

    print_banner(&config);

    let server = WatchServer::new(config.server.clone(), state);
    server
        .start(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn print_banner(config: &WatchConfig) {
    println!();
    println!("  Screen Watch {}", env!("CARGO_PKG_VERSION"));
    println!("  Environment: {}", config.environment);
    println!("  Capture:     {}", config.capture_mode());
    println!(
        "  API:         http://{}:{}/monitoring/status",
        config.server.host, config.server.port
    );
    println!();
}
