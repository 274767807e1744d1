//! Hotel Server -- library crate for the hotel directory service.
//!
//! Exposes the dispatcher, handlers, scheduler and notifier so the binary and
//! the integration tests drive the same code.

pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod notifier;
pub mod scheduler;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use hotel_crypto::PasswordHasher;
use hotel_ranking::RankingEngine;
use hotel_storage::EntityStore;
use tokio::sync::broadcast;

pub use dispatcher::Dispatcher;

/// Shared state reachable from every connection and background job.
pub struct ServerContext {
    pub store: Arc<EntityStore>,
    pub rankings: Arc<RankingEngine>,
    pub hasher: Arc<dyn PasswordHasher>,
}

impl ServerContext {
    pub fn new(
        store: Arc<EntityStore>,
        rankings: Arc<RankingEngine>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            store,
            rankings,
            hasher,
        }
    }
}

/// Current wall clock in unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_or_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn dirs_or_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Run the dispatcher on a dedicated I/O thread with a single-threaded runtime.
///
/// Every client connection is served from this one thread.
pub fn spawn_io_thread(
    listener: std::net::TcpListener,
    ctx: Arc<ServerContext>,
    shutdown: broadcast::Receiver<()>,
) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    std::thread::Builder::new()
        .name("hotel-io".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                let dispatcher = Dispatcher::from_std(listener, ctx)?;
                dispatcher.run(shutdown).await;
                Ok(())
            })
        })
}
