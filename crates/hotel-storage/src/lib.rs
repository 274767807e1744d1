//! Hotel Storage -- entity store and JSON persistence.
//!
//! The store lives in memory for the lifetime of the server. Persistence is
//! a snapshot written by the background jobs and at shutdown.

pub mod model;
pub mod persist;
pub mod store;

pub use model::{Badge, Hotel, HotelRecord, Review, User, SCORE_MAX, SCORE_MIN};
pub use persist::HotelSource;
pub use store::{EntityStore, ReviewError};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no records in {0}")]
    Empty(PathBuf),
    #[error("unusable state file {path} could not be moved aside: {source}")]
    SetAside {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;
