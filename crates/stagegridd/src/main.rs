//! stagegridd: the Stagegrid daemon.
//!
//! # Usage
//!
//! ```text
//! stagegridd run --config /etc/stagegrid/stagegrid.toml --port 8480
//! stagegridd plan --rollout argocd/web --data-dir /var/lib/stagegrid
//! stagegridd config
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stagegrid_core::StagegridConfig;
use stagegrid_rollout::NoopDispatcher;
use stagegrid_state::{RolloutKey, StateStore};
use stagegridd::control::{resync_loop, worker_loop, EventWatcher};
use stagegridd::queue::WorkQueue;
use stagegridd::reconciler::Reconciler;

const DEFAULT_LOG_FILTER: &str = "info,stagegridd=debug,stagegrid=debug";

#[derive(Parser)]
#[command(name = "stagegridd", about = "Stagegrid progressive rollout controller")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller and the REST API.
    Run {
        /// Path to stagegrid.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Evaluate one rollout without dispatching anything and print the report.
    ///
    /// Opens the state database directly and needs its exclusive lock, so it
    /// cannot run against the data directory of a running `stagegridd run`.
    /// Point `--data-dir` at a stopped daemon's directory or a copy of it.
    Plan {
        /// Rollout to evaluate, as `namespace/name`.
        #[arg(long)]
        rollout: String,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => {
            let mut config = StagegridConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = data_dir {
                config.server.data_dir = dir;
            }
            run(config).await
        }
        Command::Plan {
            rollout,
            config,
            data_dir,
        } => {
            let mut config = StagegridConfig::load(config.as_deref())?;
            if let Some(dir) = data_dir {
                config.server.data_dir = dir;
            }
            plan(&config, &rollout).await
        }
        Command::Config { config } => {
            let config = StagegridConfig::load(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config: StagegridConfig) -> anyhow::Result<()> {
    info!("Stagegrid daemon starting");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join(stagegridd::DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let dispatcher = Arc::new(stagegridd::command_dispatcher(&config));
    let controller = stagegridd::build_controller(&config, &store, dispatcher);
    info!(
        program = %config.dispatch.program,
        requeue_delay_secs = config.controller.requeue_delay_secs,
        rounding = ?config.controller.rounding,
        "stage controller initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let queue = WorkQueue::new();

    // Subscribe before the resync so no write between the two is missed.
    let watcher = EventWatcher::new(store.clone(), queue.clone());
    let watcher_handle = tokio::spawn(watcher.run(shutdown_rx.clone()));

    let resync_handle = tokio::spawn(resync_loop(
        store.clone(),
        queue.clone(),
        config.resync_interval(),
        shutdown_rx.clone(),
    ));

    let reconciler = Reconciler::new(store.clone(), controller);
    let worker_handle = tokio::spawn(worker_loop(reconciler, queue, shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = stagegrid_api::build_router(store);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = watcher_handle.await;
    let _ = resync_handle.await;
    let _ = worker_handle.await;

    info!("Stagegrid daemon stopped");
    Ok(())
}

async fn plan(config: &StagegridConfig, rollout: &str) -> anyhow::Result<()> {
    let key: RolloutKey = rollout.parse()?;
    let db_path = config.server.data_dir.join(stagegridd::DB_FILE);
    let store = StateStore::open(&db_path).with_context(|| {
        format!(
            "cannot open {} (is a daemon running on this data directory?)",
            db_path.display()
        )
    })?;

    let rollout = store
        .get_rollout(&key)?
        .ok_or_else(|| anyhow::anyhow!("rollout {key} not found"))?;

    let controller = stagegridd::build_controller(config, &store, Arc::new(NoopDispatcher));
    let report = controller.reconcile(&rollout.spec).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
