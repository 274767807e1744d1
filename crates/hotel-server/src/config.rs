//! Configuration types for hotel-server.
//! Parsed from a TOML file (default `hotel-server.toml`).

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::expand_tilde;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub multicast: MulticastSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub security: SecuritySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastSection {
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,
    #[serde(default = "default_multicast_port")]
    pub port: u16,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for MulticastSection {
    fn default() -> Self {
        Self {
            group: default_group(),
            port: default_multicast_port(),
            ttl: default_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_seed_hotels")]
    pub seed_hotels: String,
    #[serde(default = "default_hotels")]
    pub hotels: String,
    #[serde(default = "default_users")]
    pub users: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            seed_hotels: default_seed_hotels(),
            hotels: default_hotels(),
            users: default_users(),
        }
    }
}

impl StorageSection {
    pub fn seed_hotels_path(&self) -> PathBuf {
        expand_tilde(&self.seed_hotels)
    }

    pub fn hotels_path(&self) -> PathBuf {
        expand_tilde(&self.hotels)
    }

    pub fn users_path(&self) -> PathBuf {
        expand_tilde(&self.users)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_60")]
    pub persist_interval_secs: u64,
    #[serde(default = "default_30")]
    pub ranking_interval_secs: u64,
    #[serde(default = "default_workers")]
    pub worker_threads: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            persist_interval_secs: 60,
            ranking_interval_secs: 30,
            worker_threads: 3,
        }
    }
}

impl SchedulerSection {
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }

    pub fn ranking_interval(&self) -> Duration {
        Duration::from_secs(self.ranking_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    #[serde(default = "default_log_n")]
    pub scrypt_log_n: u8,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            scrypt_log_n: default_log_n(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "127.0.0.1:6789".into()
}
fn default_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 32, 32)
}
fn default_multicast_port() -> u16 {
    4446
}
fn default_ttl() -> u32 {
    1
}
fn default_seed_hotels() -> String {
    "data/Hotels.json".into()
}
fn default_hotels() -> String {
    "data/hotels_state.json".into()
}
fn default_users() -> String {
    "data/users.json".into()
}
fn default_60() -> u64 {
    60
}
fn default_30() -> u64 {
    30
}
fn default_workers() -> usize {
    3
}
fn default_log_n() -> u8 {
    hotel_crypto::DEFAULT_LOG_N
}

impl ServerConfig {
    /// Load config from file, or use defaults if it is missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ServerConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
