//! Per-signature result cache with stale-while-revalidate semantics.
//!
//! Each entry is a complete, previously-valid snapshot; a failed refresh
//! never touches what is already cached. Freshness is time-based, decided
//! against an `Instant` the caller supplies.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::api_client::{GrantSummary, SearchResponse, StatsSummary};

/// The paginated result snapshot for one query signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub records: Vec<GrantSummary>,
    pub total_count: usize,
    pub page: u32,
    pub total_pages: u32,
}

impl ResultSet {
    pub fn from_response(response: SearchResponse) -> Self {
        let page_size = response.page_size.max(1) as usize;
        let total_pages = ((response.total_count + page_size - 1) / page_size) as u32;
        Self {
            records: response.records,
            total_count: response.total_count,
            page: response.page,
            total_pages,
        }
    }

    /// Zero matches is a valid state, not an error
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

/// What the cache knows about a signature at a point in time
#[derive(Debug)]
pub enum CacheDecision<'a> {
    /// Entry younger than the freshness threshold; no refresh needed
    Fresh(&'a ResultSet),
    /// Entry exists but is past the threshold; display it, refresh behind it
    Stale(&'a ResultSet),
    /// Nothing cached for this signature yet
    Miss,
}

struct CacheEntry {
    result: ResultSet,
    fetched_at: Instant,
}

pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn lookup(&self, signature: &str, now: Instant) -> CacheDecision<'_> {
        match self.entries.get(signature) {
            Some(entry) if now.duration_since(entry.fetched_at) < self.ttl => {
                CacheDecision::Fresh(&entry.result)
            }
            Some(entry) => CacheDecision::Stale(&entry.result),
            None => CacheDecision::Miss,
        }
    }

    pub fn get(&self, signature: &str) -> Option<&ResultSet> {
        self.entries.get(signature).map(|entry| &entry.result)
    }

    /// Store a successful fetch. Replaces any previous snapshot whole.
    pub fn insert(&mut self, signature: &str, result: ResultSet, now: Instant) {
        debug!(
            target: "cache",
            signature = &signature[..12.min(signature.len())],
            total = result.total_count,
            "caching result set"
        );
        self.entries.insert(
            signature.to_string(),
            CacheEntry {
                result,
                fetched_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self, now: Instant) -> CacheStats {
        let total_records: usize = self
            .entries
            .values()
            .map(|entry| entry.result.records.len())
            .sum();

        CacheStats {
            entries: self.entries.len(),
            total_records,
            oldest_age: self
                .entries
                .values()
                .map(|entry| now.duration_since(entry.fetched_at))
                .max(),
            newest_age: self
                .entries
                .values()
                .map(|entry| now.duration_since(entry.fetched_at))
                .min(),
        }
    }
}

#[derive(Debug)]
pub struct CacheStats {
    pub entries: usize,
    pub total_records: usize,
    pub oldest_age: Option<Duration>,
    pub newest_age: Option<Duration>,
}

impl CacheStats {
    pub fn summary(&self) -> String {
        match self.oldest_age {
            Some(oldest) => format!(
                "{} entries, {} records, oldest {}s",
                self.entries,
                self.total_records,
                oldest.as_secs()
            ),
            None => "empty".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum StatsDecision<'a> {
    Fresh(&'a StatsSummary),
    Stale(&'a StatsSummary),
    Miss,
}

/// Single-slot cache for the aggregate stats read. Aggregates move slower
/// than paginated results, so this carries its own longer threshold.
pub struct StatsCache {
    entry: Option<(StatsSummary, Instant)>,
    ttl: Duration,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    pub fn lookup(&self, now: Instant) -> StatsDecision<'_> {
        match &self.entry {
            Some((stats, fetched_at)) if now.duration_since(*fetched_at) < self.ttl => {
                StatsDecision::Fresh(stats)
            }
            Some((stats, _)) => StatsDecision::Stale(stats),
            None => StatsDecision::Miss,
        }
    }

    pub fn get(&self) -> Option<&StatsSummary> {
        self.entry.as_ref().map(|(stats, _)| stats)
    }

    pub fn insert(&mut self, stats: StatsSummary, now: Instant) {
        self.entry = Some((stats, now));
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
