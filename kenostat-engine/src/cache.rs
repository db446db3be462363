//! Mémoïsation des prédictions.
//!
//! La clé contient la longueur de l'historique : tout ajout invalide
//! naturellement les entrées, purgées à l'insertion suivante.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::GeneratorConfig;
use crate::generators::StrategyKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredictionKey {
    pub method: StrategyKind,
    pub count: usize,
    pub config_signature: String,
    pub history_len: usize,
}

#[derive(Debug, Clone)]
pub struct PredictionEntry {
    pub predictions: Vec<u8>,
    pub computed_at: DateTime<Utc>,
}

/// Signature d'une configuration : sa forme JSON, préfixée par la taille
/// d'échantillon qui détermine aussi l'entrée des générateurs.
pub fn config_signature(config: &GeneratorConfig, sample_size: usize) -> String {
    let json = serde_json::to_string(config).unwrap_or_default();
    format!("{sample_size}:{json}")
}

#[derive(Debug, Default)]
pub struct PredictionCache {
    entries: HashMap<PredictionKey, PredictionEntry>,
    hits: u64,
    misses: u64,
}

impl PredictionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PredictionKey) -> Option<&PredictionEntry> {
        self.entries.get(key)
    }

    pub fn get_or_compute(&mut self, key: PredictionKey, compute: impl FnOnce() -> Vec<u8>) -> Vec<u8> {
        if let Some(entry) = self.entries.get(&key) {
            self.hits += 1;
            return entry.predictions.clone();
        }
        self.misses += 1;
        let predictions = compute();
        self.insert(key, predictions.clone());
        predictions
    }

    /// Insère et purge les entrées calculées sur une autre longueur d'historique.
    pub fn insert(&mut self, key: PredictionKey, predictions: Vec<u8>) {
        let history_len = key.history_len;
        self.entries.retain(|k, _| k.history_len == history_len);
        self.entries.insert(
            key,
            PredictionEntry {
                predictions,
                computed_at: Utc::now(),
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

    /// (succès, échecs)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(method: StrategyKind, history_len: usize) -> PredictionKey {
        PredictionKey {
            method,
            count: 10,
            config_signature: config_signature(&GeneratorConfig::default(), 100),
            history_len,
        }
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let mut cache = PredictionCache::new();
        let mut calls = 0;
        let first = cache.get_or_compute(key(StrategyKind::Frequency, 5), || {
            calls += 1;
            vec![1, 2, 3]
        });
        let second = cache.get_or_compute(key(StrategyKind::Frequency, 5), || {
            calls += 1;
            vec![9, 9, 9]
        });
        assert_eq!(first, second);
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_new_history_len_prunes_stale_entries() {
        let mut cache = PredictionCache::new();
        cache.insert(key(StrategyKind::Frequency, 5), vec![1]);
        cache.insert(key(StrategyKind::Cold, 5), vec![2]);
        assert_eq!(cache.len(), 2);
        cache.insert(key(StrategyKind::Frequency, 6), vec![3]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(StrategyKind::Cold, 5)).is_none());
    }

    #[test]
    fn test_signature_tracks_config() {
        let base = GeneratorConfig::default();
        let mut other = base.clone();
        other.momentum.threshold = 2.0;
        assert_ne!(config_signature(&base, 100), config_signature(&other, 100));
        assert_ne!(config_signature(&base, 100), config_signature(&base, 50));
        let mut delegated = base.clone();
        delegated.auto_delegate = Some(StrategyKind::Cold);
        assert_ne!(config_signature(&base, 100), config_signature(&delegated, 100));
    }
}
