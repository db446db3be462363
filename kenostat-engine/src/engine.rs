//! Point d'entrée : historique, caches, comparateur et événements.
//!
//! Un ajout de partie déclenche, dans l'ordre : écriture différée, purge
//! du cache des combinaisons, évaluation des prédictions en jeu, puis
//! nouvelles prédictions pour la partie suivante.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use kenostat_db::history::HistoryStore;
use kenostat_db::models::Round;
use kenostat_db::store::KeyValueStore;

use crate::cache::{config_signature, PredictionCache, PredictionKey};
use crate::comparison::{ComparisonDataPoint, ComparisonTracker, LeaderboardEntry};
use crate::config::{EngineConfig, GeneratorConfig};
use crate::events::{EngineEvent, EventBus};
use crate::generators::{self, StrategyKind};
use crate::patterns::cache::{PatternCache, PatternKey};
use crate::patterns::{rank_patterns, tally_patterns, PatternReport, SortMode};
use crate::payout::PayoutLookup;

pub struct Engine {
    config: EngineConfig,
    history: HistoryStore,
    payouts: Box<dyn PayoutLookup>,
    predictions: PredictionCache,
    patterns: PatternCache,
    tracker: ComparisonTracker,
    events: EventBus,
}

impl Engine {
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
        payouts: Box<dyn PayoutLookup>,
    ) -> Result<Self> {
        let history = HistoryStore::load(store, config.history_options()).await?;
        log::info!("{} partie(s) chargée(s)", history.len());

        let mut engine = Self {
            patterns: PatternCache::new(config.pattern_ttl()),
            tracker: ComparisonTracker::new(&StrategyKind::TRACKED, config.lookback, config.difficulty),
            predictions: PredictionCache::new(),
            events: EventBus::default(),
            history,
            payouts,
            config,
        };
        engine.refresh_predictions();
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn tracker(&self) -> &ComparisonTracker {
        &self.tracker
    }

    pub fn prediction_cache(&self) -> &PredictionCache {
        &self.predictions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Ajoute une partie ; retourne son index.
    pub fn append(&mut self, round: Round) -> usize {
        let drawn = round.drawn().to_vec();
        let index = self.history.append(round);

        let cleared = self.patterns.clear();
        self.events.publish(EngineEvent::PatternCacheCleared { entries: cleared });
        self.events.publish(EngineEvent::RoundSaved { index });
        self.events.publish(EngineEvent::HistoryUpdated { len: self.history.len() });

        self.track_round(index, &drawn);
        self.refresh_predictions();
        index
    }

    /// Confronte les prédictions en jeu à un tirage.
    pub fn track_round(&mut self, index: usize, drawn: &[u8]) -> Option<ComparisonDataPoint> {
        self.tracker
            .track_round(index, drawn, self.payouts.as_ref())
            .cloned()
    }

    /// Recalcule les prédictions de chaque méthode suivie et les met en jeu.
    pub fn refresh_predictions(&mut self) {
        let generator = self.config.generator.clone();
        let count = self.config.prediction_count;
        let methods = self.tracker.methods().to_vec();

        let mut in_play = Vec::with_capacity(methods.len());
        for method in methods {
            let predictions = self.generate_with(method, count, &generator);
            self.events.publish(EngineEvent::GeneratorUpdated {
                method,
                predictions: predictions.clone(),
            });
            in_play.push((method, predictions));
        }
        self.tracker.capture(in_play);
    }

    /// Nom de méthode inconnu : résultat vide.
    pub fn generate(&mut self, method: &str, count: usize) -> Vec<u8> {
        match method.parse::<StrategyKind>() {
            Ok(kind) => {
                let generator = self.config.generator.clone();
                self.generate_with(kind, count, &generator)
            }
            Err(e) => {
                log::warn!("{e}");
                Vec::new()
            }
        }
    }

    pub fn generate_with(&mut self, kind: StrategyKind, count: usize, generator: &GeneratorConfig) -> Vec<u8> {
        let mut generator = generator.clone();
        if kind == StrategyKind::Auto {
            generator.auto_delegate = self.tracker.best_method();
        }
        let key = PredictionKey {
            method: kind,
            count,
            config_signature: config_signature(&generator, self.config.sample_size),
            history_len: self.history.len(),
        };
        let sample = self.history.sample(self.config.sample_size);
        self.predictions
            .get_or_compute(key, || generators::generate(kind, count, sample, &generator))
    }

    pub fn find_patterns(&mut self, k: usize, sample_size: usize, mode: SortMode, top_n: usize) -> PatternReport {
        self.find_patterns_at(k, sample_size, mode, top_n, Utc::now())
    }

    pub fn find_patterns_at(
        &mut self,
        k: usize,
        sample_size: usize,
        mode: SortMode,
        top_n: usize,
        now: DateTime<Utc>,
    ) -> PatternReport {
        let key = PatternKey {
            pattern_size: k,
            history_len: self.history.len(),
            sample_size,
        };
        if let Some(tally) = self.patterns.get_at(&key, now) {
            log::debug!("Combinaisons de {k} servies depuis le cache");
            return rank_patterns(tally, mode, top_n);
        }

        let sample = self.history.sample(sample_size);
        let base_index = self.history.len() - sample.len();
        let tally = tally_patterns(k, sample, base_index);
        let ranked = rank_patterns(&tally, mode, top_n);
        self.patterns.insert_at(key, tally, now);
        ranked
    }

    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.tracker.leaderboard()
    }

    pub fn best_method(&self) -> Option<StrategyKind> {
        self.tracker.best_method()
    }

    pub async fn flush(&self) -> Result<()> {
        self.history.flush().await
    }

    /// Efface l'historique persisté et tous les états dérivés.
    pub async fn clear(&mut self) -> Result<()> {
        self.history.clear().await?;
        self.predictions.clear();
        let cleared = self.patterns.clear();
        self.tracker.clear();
        self.events.publish(EngineEvent::PatternCacheCleared { entries: cleared });
        self.events.publish(EngineEvent::HistoryUpdated { len: 0 });
        self.refresh_predictions();
        Ok(())
    }
}
