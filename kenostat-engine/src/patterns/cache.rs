use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::PatternReport;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pub pattern_size: usize,
    pub history_len: usize,
    pub sample_size: usize,
}

#[derive(Debug, Clone)]
struct PatternCacheEntry {
    tally: PatternReport,
    timestamp: DateTime<Utc>,
}

/// Dénombrements complets, valables `ttl` et vidés à chaque ajout de partie.
#[derive(Debug)]
pub struct PatternCache {
    ttl: TimeDelta,
    entries: HashMap<PatternKey, PatternCacheEntry>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PatternCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &PatternKey) -> Option<&PatternReport> {
        self.get_at(key, Utc::now())
    }

    /// Une entrée plus vieille que le TTL est ignorée.
    pub fn get_at(&self, key: &PatternKey, now: DateTime<Utc>) -> Option<&PatternReport> {
        self.entries
            .get(key)
            .filter(|entry| now.signed_duration_since(entry.timestamp) < self.ttl)
            .map(|entry| &entry.tally)
    }

    pub fn insert(&mut self, key: PatternKey, tally: PatternReport) {
        self.insert_at(key, tally, Utc::now());
    }

    pub fn insert_at(&mut self, key: PatternKey, tally: PatternReport, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.timestamp) < ttl);
        self.entries.insert(key, PatternCacheEntry { tally, timestamp: now });
    }

    /// Retourne le nombre d'entrées supprimées.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternStats;

    fn key() -> PatternKey {
        PatternKey { pattern_size: 3, history_len: 200, sample_size: 100 }
    }

    fn report() -> PatternReport {
        PatternReport {
            patterns: Vec::new(),
            stats: PatternStats { sample_size: 100, ..PatternStats::default() },
        }
    }

    #[test]
    fn test_fresh_entry_is_served() {
        let mut cache = PatternCache::default();
        let now = Utc::now();
        cache.insert_at(key(), report(), now - TimeDelta::milliseconds(1_000));
        assert!(cache.get_at(&key(), now).is_some());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let mut cache = PatternCache::new(Duration::from_millis(300_000));
        let now = Utc::now();
        cache.insert_at(key(), report(), now - TimeDelta::milliseconds(400_000));
        assert!(cache.get_at(&key(), now).is_none());
    }

    #[test]
    fn test_key_mismatch_is_a_miss() {
        let mut cache = PatternCache::default();
        cache.insert(key(), report());
        let other = PatternKey { history_len: 201, ..key() };
        assert!(cache.get(&other).is_none());
        assert!(cache.get(&key()).is_some());
    }

    #[test]
    fn test_clear_reports_removed() {
        let mut cache = PatternCache::default();
        cache.insert(key(), report());
        cache.insert(PatternKey { pattern_size: 2, ..key() }, report());
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_purges_expired() {
        let mut cache = PatternCache::new(Duration::from_secs(10));
        let now = Utc::now();
        cache.insert_at(key(), report(), now - TimeDelta::seconds(60));
        cache.insert_at(PatternKey { pattern_size: 2, ..key() }, report(), now);
        assert_eq!(cache.len(), 1);
    }
}
