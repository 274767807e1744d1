//! In-memory entity store shared by the connection handlers and background jobs.
//!
//! Every map is a sharded `DashMap`: no global lock. Shard guards are never
//! held across calls into another map or into a hotel's own lock.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::model::{scores_in_range, Badge, Hotel, HotelRecord, Review, User};
use crate::persist;
use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("score outside the accepted range")]
    InvalidScores,
    #[error("no such hotel")]
    HotelNotFound,
    #[error("no such user")]
    UnknownUser,
}

pub struct EntityStore {
    hotels: DashMap<String, Arc<Hotel>>,
    /// (city, name) -> hotel id.
    by_city_name: DashMap<(String, String), String>,
    users: DashMap<String, User>,
    /// Usernames currently logged in on some connection.
    active: DashSet<String>,
    next_review_id: AtomicU64,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            hotels: DashMap::new(),
            by_city_name: DashMap::new(),
            users: DashMap::new(),
            active: DashSet::new(),
            next_review_id: AtomicU64::new(1),
        }
    }

    /// Build a store from loaded records. The review-id counter resumes above
    /// the highest persisted id.
    pub fn from_records(hotels: Vec<HotelRecord>, users: Vec<User>) -> Self {
        let store = Self::new();
        for record in hotels {
            store.insert_hotel(Hotel::from_record(record));
        }
        for user in users {
            store.users.insert(user.username.clone(), user);
        }
        store
    }

    /// Load hotels and users from disk.
    ///
    /// Hotels: enriched file first, then the seed file, else empty (logged as
    /// an error). Users: empty on any failure. Broken state files are moved
    /// aside by the loaders. The only error is a broken hotel state file that
    /// could not be moved, since the first save would overwrite it.
    pub fn load(enriched_hotels: &Path, seed_hotels: &Path, users_path: &Path) -> crate::Result<Self> {
        let hotels = match persist::load_hotels(enriched_hotels, seed_hotels) {
            Ok((records, source)) => {
                tracing::info!(count = records.len(), ?source, "hotels loaded");
                records
            }
            Err(e @ StorageError::SetAside { .. }) => return Err(e),
            Err(e) => {
                tracing::error!(
                    enriched = %enriched_hotels.display(),
                    seed = %seed_hotels.display(),
                    "no hotel data could be loaded, starting empty: {e}"
                );
                Vec::new()
            }
        };

        let users = match persist::load_users(users_path) {
            Ok(users) => {
                tracing::info!(count = users.len(), path = %users_path.display(), "users loaded");
                users
            }
            Err(e) => {
                tracing::error!(path = %users_path.display(), "starting with no users: {e}");
                Vec::new()
            }
        };

        Ok(Self::from_records(hotels, users))
    }

    pub fn insert_hotel(&self, hotel: Hotel) -> Arc<Hotel> {
        if let Some(max) = hotel.max_review_id() {
            self.next_review_id.fetch_max(max + 1, Ordering::SeqCst);
        }
        let hotel = Arc::new(hotel);
        self.by_city_name
            .insert((hotel.city.clone(), hotel.name.clone()), hotel.id.clone());
        self.hotels.insert(hotel.id.clone(), Arc::clone(&hotel));
        hotel
    }

    pub fn hotel(&self, id: &str) -> Option<Arc<Hotel>> {
        self.hotels.get(id).map(|h| Arc::clone(h.value()))
    }

    pub fn find_hotel(&self, name: &str, city: &str) -> Option<Arc<Hotel>> {
        let id = self
            .by_city_name
            .get(&(city.to_owned(), name.to_owned()))
            .map(|id| id.value().clone())?;
        self.hotel(&id)
    }

    pub fn hotels(&self) -> Vec<Arc<Hotel>> {
        self.hotels.iter().map(|h| Arc::clone(h.value())).collect()
    }

    pub fn hotels_in_city(&self, city: &str) -> Vec<Arc<Hotel>> {
        self.hotels
            .iter()
            .filter(|h| h.city == city)
            .map(|h| Arc::clone(h.value()))
            .collect()
    }

    pub fn cities(&self) -> BTreeSet<String> {
        self.hotels.iter().map(|h| h.city.clone()).collect()
    }

    pub fn hotel_count(&self) -> usize {
        self.hotels.len()
    }

    /// Insert a new user. Returns `false` if the username is taken.
    pub fn register_user(&self, user: User) -> bool {
        match self.users.entry(user.username.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(user);
                true
            }
        }
    }

    pub fn user(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|u| u.value().clone())
    }

    pub fn password_digest(&self, username: &str) -> Option<String> {
        self.users
            .get(username)
            .map(|u| u.password_digest.clone())
    }

    pub fn badge(&self, username: &str) -> Option<Badge> {
        self.users.get(username).map(|u| u.badge)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Mark `username` as logged in. Returns `false` if it already is.
    pub fn try_activate(&self, username: &str) -> bool {
        self.active.insert(username.to_owned())
    }

    pub fn deactivate(&self, username: &str) {
        self.active.remove(username);
    }

    pub fn is_active(&self, username: &str) -> bool {
        self.active.contains(username)
    }

    pub fn next_review_id(&self) -> u64 {
        self.next_review_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Store a review by `username` for the hotel `(name, city)` and bump the
    /// reviewer's counter and badge.
    pub fn add_review(
        &self,
        username: &str,
        name: &str,
        city: &str,
        scores: [i32; 5],
        now: i64,
    ) -> Result<Review, ReviewError> {
        if !scores_in_range(&scores) {
            return Err(ReviewError::InvalidScores);
        }
        let hotel = self
            .find_hotel(name, city)
            .ok_or(ReviewError::HotelNotFound)?;

        {
            let mut user = self
                .users
                .get_mut(username)
                .ok_or(ReviewError::UnknownUser)?;
            user.record_review();
        }

        let review = Review::new(self.next_review_id(), scores, now);
        hotel.add_review(review);
        Ok(review)
    }

    /// Point-in-time copy of every hotel, sorted by name.
    pub fn snapshot_hotels(&self) -> Vec<HotelRecord> {
        let mut records: Vec<HotelRecord> = self.hotels().iter().map(|h| h.to_record()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Point-in-time copy of every user, sorted by username.
    pub fn snapshot_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }
}
