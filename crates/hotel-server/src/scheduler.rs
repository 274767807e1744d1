//! Background jobs: hotel persistence, user persistence, ranking recomputation.
//!
//! Each job copies what it needs out of the store, drops every lock, then
//! does its file or socket I/O. A failed run is logged and retried on the
//! next tick.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hotel_ranking::RankingEngine;
use hotel_storage::{persist, EntityStore, StorageError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{SchedulerSection, StorageSection};
use crate::notifier::Notifier;
use crate::unix_now;

/// Resolved storage file locations.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub seed_hotels: PathBuf,
    pub hotels: PathBuf,
    pub users: PathBuf,
}

impl From<&StorageSection> for StoragePaths {
    fn from(cfg: &StorageSection) -> Self {
        Self {
            seed_hotels: cfg.seed_hotels_path(),
            hotels: cfg.hotels_path(),
            users: cfg.users_path(),
        }
    }
}

/// Snapshot the hotels (sorted by name) and write them out.
pub async fn persist_hotels(store: &EntityStore, path: PathBuf) -> Result<usize, StorageError> {
    let records = store.snapshot_hotels();
    let count = records.len();
    tokio::task::spawn_blocking(move || persist::save_hotels(&path, &records))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
    Ok(count)
}

pub async fn persist_users(store: &EntityStore, path: PathBuf) -> Result<usize, StorageError> {
    let users = store.snapshot_users();
    let count = users.len();
    tokio::task::spawn_blocking(move || persist::save_users(&path, &users))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
    Ok(count)
}

/// Recompute every ranking at `now` and announce each city whose top changed.
///
/// Returns the number of notifications sent.
pub async fn ranking_cycle(
    store: &EntityStore,
    rankings: &RankingEngine,
    notifier: Option<&Notifier>,
    now: i64,
) -> usize {
    let previous = rankings.recompute(store, now);
    let changes = rankings.changed_tops(&previous);
    tracing::debug!(cities = previous.len(), changed = changes.len(), "rankings recomputed");

    match notifier {
        Some(notifier) if !changes.is_empty() => notifier.announce(&changes).await,
        _ => 0,
    }
}

/// Final synchronous flush at shutdown.
pub fn flush(store: &EntityStore, paths: &StoragePaths) {
    match persist::save_hotels(&paths.hotels, &store.snapshot_hotels()) {
        Ok(()) => tracing::info!(path = %paths.hotels.display(), "hotels saved"),
        Err(e) => tracing::error!(path = %paths.hotels.display(), "final hotel save failed: {e}"),
    }
    match persist::save_users(&paths.users, &store.snapshot_users()) {
        Ok(()) => tracing::info!(path = %paths.users.display(), "users saved"),
        Err(e) => tracing::error!(path = %paths.users.display(), "final user save failed: {e}"),
    }
}

/// Run `job` every `period` until shutdown. The first run happens one full
/// period after start.
async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => job().await,
            _ = shutdown.recv() => {
                tracing::info!(job = name, "job stopped");
                return;
            }
        }
    }
}

/// Spawn the three periodic jobs on the current (worker) runtime.
pub fn spawn_jobs(
    store: Arc<EntityStore>,
    rankings: Arc<RankingEngine>,
    notifier: Option<Arc<Notifier>>,
    paths: StoragePaths,
    cfg: &SchedulerSection,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(3);

    {
        let store = Arc::clone(&store);
        let path = paths.hotels.clone();
        handles.push(tokio::spawn(run_periodic(
            "persist-hotels",
            cfg.persist_interval(),
            shutdown.subscribe(),
            move || {
                let store = Arc::clone(&store);
                let path = path.clone();
                async move {
                    match persist_hotels(&store, path.clone()).await {
                        Ok(count) => tracing::debug!(count, path = %path.display(), "hotels persisted"),
                        Err(e) => tracing::warn!(path = %path.display(), "hotel persistence failed: {e}"),
                    }
                }
            },
        )));
    }

    {
        let store = Arc::clone(&store);
        let path = paths.users.clone();
        handles.push(tokio::spawn(run_periodic(
            "persist-users",
            cfg.persist_interval(),
            shutdown.subscribe(),
            move || {
                let store = Arc::clone(&store);
                let path = path.clone();
                async move {
                    match persist_users(&store, path.clone()).await {
                        Ok(count) => tracing::debug!(count, path = %path.display(), "users persisted"),
                        Err(e) => tracing::warn!(path = %path.display(), "user persistence failed: {e}"),
                    }
                }
            },
        )));
    }

    handles.push(tokio::spawn(run_periodic(
        "rankings",
        cfg.ranking_interval(),
        shutdown.subscribe(),
        move || {
            let store = Arc::clone(&store);
            let rankings = Arc::clone(&rankings);
            let notifier = notifier.clone();
            async move {
                ranking_cycle(&store, &rankings, notifier.as_deref(), unix_now()).await;
            }
        },
    )));

    handles
}
