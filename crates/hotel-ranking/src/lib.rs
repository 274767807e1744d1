//! Hotel Ranking -- time-decayed review averages and per-city leaderboards.
//!
//! A review loses weight as it ages: `exp(-days / 300)` where `days` is the
//! number of whole days since it was written. A hotel's average is the sum of
//! each review's mean score times its weight, divided by the review count.

pub mod engine;

pub use engine::{CityRanking, RankEntry, RankingEngine, TopChange};

use hotel_storage::{Hotel, Review};

/// Decay constant in days.
pub const DECAY_DAYS: f64 = 300.0;
pub const SECS_PER_DAY: i64 = 86_400;

/// Weight in (0, 1] of a review created at `created` (unix seconds), seen at `now`.
///
/// Timestamps in the future count as zero days old.
pub fn review_weight(created: i64, now: i64) -> f64 {
    let days = now.saturating_sub(created).max(0) / SECS_PER_DAY;
    (-(days as f64) / DECAY_DAYS).exp()
}

/// Weighted average of `reviews` at `now`; 0 with no reviews.
pub fn weighted_average(reviews: &[Review], now: i64) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: f64 = reviews
        .iter()
        .map(|r| r.mean_score() * review_weight(r.timestamp, now))
        .sum();
    sum / reviews.len() as f64
}

/// The hotel's cached average, recomputed at `now` if a review invalidated it.
pub fn hotel_average(hotel: &Hotel, now: i64) -> f64 {
    hotel.average_or_compute(|reviews| weighted_average(reviews, now))
}
