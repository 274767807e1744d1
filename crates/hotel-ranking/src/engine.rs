//! Ranking engine -- builds and swaps per-city leaderboards.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use hotel_storage::{EntityStore, Hotel};

use crate::weighted_average;

/// One hotel's position key inside a city ranking.
///
/// Ordered by average descending, then review count descending, then hotel
/// id ascending. Two entries only compare equal for the same hotel id.
#[derive(Debug, Clone)]
pub struct RankEntry {
    pub average: f64,
    pub review_count: usize,
    pub hotel_id: String,
    pub hotel: Arc<Hotel>,
}

impl RankEntry {
    /// Snapshot `hotel`, recomputing its average at `now`.
    pub fn capture(hotel: Arc<Hotel>, now: i64) -> Self {
        let (average, review_count) = hotel.refresh_average(|r| weighted_average(r, now));
        Self {
            average,
            review_count,
            hotel_id: hotel.id.clone(),
            hotel,
        }
    }
}

impl Ord for RankEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .average
            .total_cmp(&self.average)
            .then_with(|| other.review_count.cmp(&self.review_count))
            .then_with(|| self.hotel_id.cmp(&other.hotel_id))
    }
}

impl PartialOrd for RankEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankEntry {}

/// The ordered hotels of one city. Immutable once built.
#[derive(Debug)]
pub struct CityRanking {
    city: String,
    entries: BTreeSet<RankEntry>,
}

impl CityRanking {
    pub fn build(city: impl Into<String>, hotels: Vec<Arc<Hotel>>, now: i64) -> Self {
        Self {
            city: city.into(),
            entries: hotels
                .into_iter()
                .map(|h| RankEntry::capture(h, now))
                .collect(),
        }
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn top(&self) -> Option<&RankEntry> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hotel_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.hotel_id.as_str()).collect()
    }
}

/// A city whose top hotel changed during a recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopChange {
    pub city: String,
    pub previous: Option<String>,
    pub hotel_id: String,
    pub hotel_name: String,
}

/// Current ranking of every city.
///
/// Readers clone an `Arc<CityRanking>`; recomputation builds a new ranking
/// off to the side and swaps it in, so nobody observes a half-built set.
#[derive(Debug, Default)]
pub struct RankingEngine {
    rankings: DashMap<String, Arc<CityRanking>>,
}

impl RankingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial rankings for every city in `store`.
    pub fn build(store: &EntityStore, now: i64) -> Self {
        let engine = Self::new();
        engine.recompute(store, now);
        engine
    }

    /// Rebuild every city's ranking at `now`.
    ///
    /// Returns the top hotel id each city had before the rebuild.
    pub fn recompute(&self, store: &EntityStore, now: i64) -> HashMap<String, Option<String>> {
        let cities = store.cities();
        let mut previous = HashMap::with_capacity(cities.len());

        for city in &cities {
            let prev_top = self.top_id(city);
            let ranking = CityRanking::build(city.clone(), store.hotels_in_city(city), now);
            tracing::debug!(city = %city, hotels = ranking.len(), "city ranking rebuilt");
            self.rankings.insert(city.clone(), Arc::new(ranking));
            previous.insert(city.clone(), prev_top);
        }
        self.rankings.retain(|city, _| cities.contains(city));

        previous
    }

    /// Cities whose current top differs from `previous`.
    pub fn changed_tops(&self, previous: &HashMap<String, Option<String>>) -> Vec<TopChange> {
        let mut changes: Vec<TopChange> = previous
            .iter()
            .filter_map(|(city, prev)| {
                let ranking = self.ranking(city)?;
                let top = ranking.top()?;
                if prev.as_deref() == Some(top.hotel_id.as_str()) {
                    return None;
                }
                Some(TopChange {
                    city: city.clone(),
                    previous: prev.clone(),
                    hotel_id: top.hotel_id.clone(),
                    hotel_name: top.hotel.name.clone(),
                })
            })
            .collect();
        changes.sort_by(|a, b| a.city.cmp(&b.city));
        changes
    }

    pub fn ranking(&self, city: &str) -> Option<Arc<CityRanking>> {
        self.rankings.get(city).map(|r| Arc::clone(r.value()))
    }

    pub fn top_id(&self, city: &str) -> Option<String> {
        self.ranking(city)?.top().map(|e| e.hotel_id.clone())
    }

    pub fn city_count(&self) -> usize {
        self.rankings.len()
    }
}
