//! Hotel Server -- hotel directory service.
//!
//! Usage:
//!   hotel-server                         # Run with default config
//!   hotel-server --config path.toml      # Run with custom config
//!   hotel-server show-config             # Print the effective configuration
//!
//! While running, a line on stdin or Ctrl-C shuts the server down cleanly.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, oneshot};

use hotel_crypto::ScryptHasher;
use hotel_ranking::RankingEngine;
use hotel_server::config::ServerConfig;
use hotel_server::notifier::Notifier;
use hotel_server::scheduler::{self, StoragePaths};
use hotel_server::{expand_tilde, spawn_io_thread, unix_now, ServerContext};
use hotel_storage::EntityStore;

#[derive(Parser)]
#[command(name = "hotel-server", about = "Hotel directory server")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "hotel-server.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Run,
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hotel_server=info,hotel_storage=info,hotel_ranking=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let cfg = ServerConfig::load_or_default(&config_path)
        .with_context(|| format!("invalid config file {}", config_path.display()))?;

    match cli.command {
        Some(Commands::ShowConfig) => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
        Some(Commands::Run) | None => run_server(cfg)?,
    }

    Ok(())
}

fn run_server(cfg: ServerConfig) -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind(&cfg.server.listen_addr)
        .with_context(|| format!("failed to bind {}", cfg.server.listen_addr))?;

    let paths = StoragePaths::from(&cfg.storage);
    let store = Arc::new(
        EntityStore::load(&paths.hotels, &paths.seed_hotels, &paths.users)
            .context("failed to load stored state")?,
    );
    let rankings = Arc::new(RankingEngine::build(&store, unix_now()));
    tracing::info!(
        hotels = store.hotel_count(),
        users = store.user_count(),
        cities = rankings.city_count(),
        "state loaded"
    );

    let ctx = Arc::new(ServerContext::new(
        Arc::clone(&store),
        Arc::clone(&rankings),
        Arc::new(ScryptHasher::new(cfg.security.scrypt_log_n)),
    ));

    let workers = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.scheduler.worker_threads.max(1))
        .thread_name("hotel-worker")
        .enable_all()
        .build()?;

    // Shutdown broadcast channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let io_thread = spawn_io_thread(listener, Arc::clone(&ctx), shutdown_tx.subscribe())?;

    workers.block_on(async {
        let notifier = match Notifier::bind(&cfg.multicast).await {
            Ok(n) => {
                tracing::info!(group = %n.target(), "ranking notifications enabled");
                Some(Arc::new(n))
            }
            Err(e) => {
                tracing::error!("multicast socket unavailable, notifications disabled: {e}");
                None
            }
        };

        let jobs = scheduler::spawn_jobs(
            Arc::clone(&store),
            Arc::clone(&rankings),
            notifier,
            paths.clone(),
            &cfg.scheduler,
            &shutdown_tx,
        );

        tracing::info!("server running, press Enter or Ctrl-C to stop");
        wait_for_stop().await;
        tracing::info!("shutting down...");
        let _ = shutdown_tx.send(());

        for job in jobs {
            if let Err(e) = job.await {
                tracing::error!("job failed: {e}");
            }
        }
    });

    match io_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("I/O thread failed: {e}"),
        Err(_) => tracing::error!("I/O thread panicked"),
    }

    scheduler::flush(&store, &paths);
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C or on a line typed on stdin. A closed stdin is ignored.
async fn wait_for_stop() {
    let (line_tx, line_rx) = oneshot::channel::<()>();
    let spawned = std::thread::Builder::new()
        .name("hotel-admin".into())
        .spawn(move || {
            let mut line = String::new();
            if let Ok(n) = std::io::stdin().lock().read_line(&mut line) {
                if n > 0 {
                    let _ = line_tx.send(());
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("stdin listener unavailable: {e}");
    }

    let stdin_stop = async {
        if line_rx.await.is_err() {
            // stdin closed without a line: only Ctrl-C remains.
            std::future::pending::<()>().await;
        }
    };

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received"),
            Err(e) => {
                tracing::warn!("Ctrl-C handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = stdin_stop => {
            tracing::info!("stop requested on stdin");
        }
    }
}
