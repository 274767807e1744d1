//! Hotels, reviews, users and badges.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive bounds for each review score.
pub const SCORE_MIN: i32 = 0;
pub const SCORE_MAX: i32 = 5;

/// One immutable review. `timestamp` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub overall: i32,
    pub position: i32,
    pub cleanliness: i32,
    pub service: i32,
    pub price: i32,
    pub timestamp: i64,
}

impl Review {
    /// Build a review from wire-order scores `[overall, position, cleanliness, service, price]`.
    pub fn new(id: u64, scores: [i32; 5], timestamp: i64) -> Self {
        let [overall, position, cleanliness, service, price] = scores;
        Self {
            id,
            overall,
            position,
            cleanliness,
            service,
            price,
            timestamp,
        }
    }

    pub fn scores(&self) -> [i32; 5] {
        [
            self.overall,
            self.position,
            self.cleanliness,
            self.service,
            self.price,
        ]
    }

    /// Unweighted mean of the five scores.
    pub fn mean_score(&self) -> f64 {
        self.scores().iter().map(|&s| f64::from(s)).sum::<f64>() / 5.0
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Whether every score lies in `[SCORE_MIN, SCORE_MAX]`.
pub fn scores_in_range(scores: &[i32; 5]) -> bool {
    scores.iter().all(|s| (SCORE_MIN..=SCORE_MAX).contains(s))
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overall {}, position {}, cleanliness {}, service {}, price {}",
            self.overall, self.position, self.cleanliness, self.service, self.price
        )?;
        if let Some(at) = self.created_at() {
            write!(f, " ({})", at.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ReviewState {
    reviews: BTreeMap<u64, Review>,
    cached_average: Option<f64>,
}

/// A hotel: immutable identity plus its reviews and cached weighted average.
///
/// The review map and the cache share one lock, so a reader never sees a new
/// review next to a stale average.
#[derive(Debug)]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub city: String,
    pub phone: String,
    pub services: Vec<String>,
    state: RwLock<ReviewState>,
}

impl Hotel {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        city: impl Into<String>,
        phone: impl Into<String>,
        services: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            city: city.into(),
            phone: phone.into(),
            services,
            state: RwLock::new(ReviewState::default()),
        }
    }

    pub fn from_record(record: HotelRecord) -> Self {
        let reviews = record
            .ratings
            .into_values()
            .map(|review| (review.id, review))
            .collect();
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            city: record.city,
            phone: record.phone,
            services: record.services,
            state: RwLock::new(ReviewState {
                reviews,
                cached_average: None,
            }),
        }
    }

    pub fn to_record(&self) -> HotelRecord {
        let ratings = self
            .read()
            .reviews
            .values()
            .map(|review| (review.id.to_string(), *review))
            .collect();
        HotelRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            city: self.city.clone(),
            phone: self.phone.clone(),
            services: self.services.clone(),
            ratings,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ReviewState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReviewState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a review and drop the cached average in the same critical section.
    pub fn add_review(&self, review: Review) {
        let mut state = self.write();
        state.reviews.insert(review.id, review);
        state.cached_average = None;
    }

    pub fn review_count(&self) -> usize {
        self.read().reviews.len()
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.read().reviews.values().copied().collect()
    }

    pub fn max_review_id(&self) -> Option<u64> {
        self.read().reviews.keys().next_back().copied()
    }

    pub fn cached_average(&self) -> Option<f64> {
        self.read().cached_average
    }

    pub fn invalidate_average(&self) {
        self.write().cached_average = None;
    }

    /// Return the cached average, computing it with `compute` if invalidated.
    pub fn average_or_compute<F>(&self, compute: F) -> f64
    where
        F: FnOnce(&[Review]) -> f64,
    {
        if let Some(avg) = self.read().cached_average {
            return avg;
        }
        let mut state = self.write();
        // Another reader may have filled it while we waited.
        if let Some(avg) = state.cached_average {
            return avg;
        }
        let reviews: Vec<Review> = state.reviews.values().copied().collect();
        let avg = compute(&reviews);
        state.cached_average = Some(avg);
        avg
    }

    /// Recompute the average unconditionally. Returns `(average, review_count)`
    /// read under one lock.
    pub fn refresh_average<F>(&self, compute: F) -> (f64, usize)
    where
        F: FnOnce(&[Review]) -> f64,
    {
        let mut state = self.write();
        let reviews: Vec<Review> = state.reviews.values().copied().collect();
        let avg = compute(&reviews);
        state.cached_average = Some(avg);
        (avg, reviews.len())
    }
}

/// Serialized hotel. Seed files share the shape minus `ratings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub ratings: BTreeMap<String, Review>,
}

/// Seed hotel: identity only. Any `rate` or integer `ratings` fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedHotel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub services: Vec<String>,
}

impl From<SeedHotel> for HotelRecord {
    fn from(seed: SeedHotel) -> Self {
        Self {
            id: seed.id,
            name: seed.name,
            description: seed.description,
            city: seed.city,
            phone: seed.phone,
            services: seed.services,
            ratings: BTreeMap::new(),
        }
    }
}

/// Reputation tier derived from a user's review count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Badge {
    #[default]
    #[serde(rename = "Reviewer")]
    Reviewer,
    #[serde(rename = "Expert Reviewer")]
    ExpertReviewer,
    #[serde(rename = "Contributor")]
    Contributor,
    #[serde(rename = "Expert Contributor")]
    ExpertContributor,
    #[serde(rename = "Super Contributor")]
    SuperContributor,
}

impl Badge {
    /// Tier reached at exactly `count` reviews, if `count` falls inside a tier.
    ///
    /// Counts 0-5, 10, 15 and 20 fall outside every tier: a user at one of
    /// those counts keeps whatever badge they held before.
    pub fn for_review_count(count: u32) -> Option<Badge> {
        match count {
            6..=9 => Some(Badge::ExpertReviewer),
            11..=14 => Some(Badge::Contributor),
            16..=19 => Some(Badge::ExpertContributor),
            21.. => Some(Badge::SuperContributor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Badge::Reviewer => "Reviewer",
            Badge::ExpertReviewer => "Expert Reviewer",
            Badge::Contributor => "Contributor",
            Badge::ExpertContributor => "Expert Contributor",
            Badge::SuperContributor => "Super Contributor",
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user. Serialized with camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub password_digest: String,
    #[serde(default)]
    pub badge: Badge,
    #[serde(default)]
    pub review_count: u32,
}

impl User {
    pub fn new(username: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_digest: password_digest.into(),
            badge: Badge::Reviewer,
            review_count: 0,
        }
    }

    /// Bump the review counter and move the badge to the tier for the new count.
    pub fn record_review(&mut self) {
        self.review_count += 1;
        if let Some(badge) = Badge::for_review_count(self.review_count) {
            self.badge = badge;
        }
    }
}
