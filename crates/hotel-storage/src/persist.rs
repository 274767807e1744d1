//! JSON load/store for hotels and users.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous file intact.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{HotelRecord, SeedHotel, User};
use crate::{Result, StorageError};

/// Which file the hotels were loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotelSource {
    Enriched,
    Seed,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read a state file that the server rewrites later. A missing file reads as
/// `None`. A file that exists but cannot be read or parsed is renamed aside
/// first, so the next save cannot overwrite it, and also reads as `None`.
fn read_state<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_json(path) {
        Ok(value) => Ok(Some(value)),
        Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            let aside = set_aside(path)?;
            tracing::error!(
                path = %path.display(),
                aside = %aside.display(),
                "state file unusable, moved aside: {e}"
            );
            Ok(None)
        }
    }
}

/// Rename `path` to `<name>.corrupt-<utc timestamp>` in the same directory.
fn set_aside(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    let aside = path.with_file_name(name);
    fs::rename(path, &aside).map_err(|source| StorageError::SetAside {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(aside)
}

/// Load hotels from the enriched file, falling back to the seed file when the
/// former is absent or holds no hotels. An enriched file that fails to parse
/// is moved aside before falling back.
pub fn load_hotels(enriched: &Path, seed: &Path) -> Result<(Vec<HotelRecord>, HotelSource)> {
    match read_state::<Vec<HotelRecord>>(enriched)? {
        Some(records) if !records.is_empty() => return Ok((records, HotelSource::Enriched)),
        Some(_) => {
            tracing::debug!(path = %enriched.display(), "enriched hotel file is empty, using seed");
        }
        None => {
            tracing::debug!(path = %enriched.display(), "no enriched hotel file, using seed");
        }
    }

    let seeds: Vec<SeedHotel> = read_json(seed)?;
    if seeds.is_empty() {
        return Err(StorageError::Empty(seed.to_path_buf()));
    }
    Ok((
        seeds.into_iter().map(HotelRecord::from).collect(),
        HotelSource::Seed,
    ))
}

/// Load users. Absent reads as no users; a broken file is moved aside first.
pub fn load_users(path: &Path) -> Result<Vec<User>> {
    Ok(read_state(path)?.unwrap_or_default())
}

pub fn save_hotels(path: &Path, hotels: &[HotelRecord]) -> Result<()> {
    write_json_atomic(path, &hotels)
}

pub fn save_users(path: &Path, users: &[User]) -> Result<()> {
    write_json_atomic(path, &users)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Pretty-print `value` to `path` via temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hotel, Review};

    const SEED: &str = r#"[
      {"id":"1","name":"Hotel Aosta 1","description":"Un ridente hotel a Aosta","city":"Aosta",
       "phone":"347-4453634","services":["TV in camera","Palestra"],"rate":0,
       "ratings":{"cleaning":0,"position":0,"services":0,"quality":0}},
      {"id":"2","name":"Hotel Aosta 2","description":"","city":"Aosta","phone":"","services":[]}
    ]"#;

    #[test]
    fn test_falls_back_to_seed_when_enriched_missing() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("Hotels.json");
        fs::write(&seed, SEED).unwrap();

        let (hotels, source) = load_hotels(&dir.path().join("missing.json"), &seed).unwrap();
        assert_eq!(source, HotelSource::Seed);
        assert_eq!(hotels.len(), 2);
        assert!(hotels.iter().all(|h| h.ratings.is_empty()));
    }

    #[test]
    fn test_falls_back_when_enriched_empty() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("Hotels.json");
        let enriched = dir.path().join("state.json");
        fs::write(&seed, SEED).unwrap();
        fs::write(&enriched, "[]").unwrap();

        let (_, source) = load_hotels(&enriched, &seed).unwrap();
        assert_eq!(source, HotelSource::Seed);
    }

    #[test]
    fn test_enriched_preferred_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let enriched = dir.path().join("state").join("hotels.json");

        let hotel = Hotel::new("5", "Hotel Bari 1", "d", "Bari", "080", vec!["bar".into()]);
        hotel.add_review(Review::new(3, [1, 2, 3, 4, 5], 1_700_000_000));
        save_hotels(&enriched, &[hotel.to_record()]).unwrap();

        let text = fs::read_to_string(&enriched).unwrap();
        assert!(text.contains("\"ratings\""));
        assert!(text.contains("\"cleanliness\": 3"));

        let (hotels, source) = load_hotels(&enriched, &dir.path().join("no-seed.json")).unwrap();
        assert_eq!(source, HotelSource::Enriched);
        assert_eq!(hotels, vec![hotel.to_record()]);
        assert!(!temp_path(&enriched).exists());
    }

    #[test]
    fn test_both_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_hotels(&dir.path().join("a.json"), &dir.path().join("b.json"));
        assert!(matches!(err, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_users_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let mut alice = User::new("alice", "scrypt$4$00$11");
        alice.record_review();
        save_users(&path, &[alice.clone()]).unwrap();
        assert_eq!(load_users(&path).unwrap(), vec![alice]);
    }

    fn aside_files(dir: &Path, name: &str) -> Vec<PathBuf> {
        let prefix = format!("{name}.corrupt-");
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix))
            })
            .collect()
    }

    #[test]
    fn test_corrupt_enriched_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let seed = dir.path().join("Hotels.json");
        let enriched = dir.path().join("state.json");
        fs::write(&seed, SEED).unwrap();
        let broken = r#"[{"id":"5","name":"Hotel Bari 1","ratings":{"#;
        fs::write(&enriched, broken).unwrap();

        let (hotels, source) = load_hotels(&enriched, &seed).unwrap();
        assert_eq!(source, HotelSource::Seed);
        assert_eq!(hotels.len(), 2);

        // The broken file is kept for inspection and no longer in the way of saves.
        assert!(!enriched.exists());
        let aside = aside_files(dir.path(), "state.json");
        assert_eq!(aside.len(), 1);
        assert_eq!(fs::read_to_string(&aside[0]).unwrap(), broken);
    }

    #[test]
    fn test_missing_users_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_users(&dir.path().join("users.json")).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_users_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "{not json").unwrap();

        assert!(load_users(&path).unwrap().is_empty());
        assert!(!path.exists());
        assert_eq!(aside_files(dir.path(), "users.json").len(), 1);
    }
}
