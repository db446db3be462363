use serde::Serialize;

use kenostat_db::models::Round;

use super::{ComparisonTracker, LeaderboardEntry};
use crate::config::{EngineConfig, GeneratorConfig};
use crate::generators::{self, StrategyKind};
use crate::payout::{Difficulty, PayoutLookup};

#[derive(Debug, Clone)]
pub struct BacktestOptions {
    /// Première partie évaluée ; les précédentes ne servent qu'à l'apprentissage.
    pub start: usize,
    pub sample_size: usize,
    pub prediction_count: usize,
    pub lookback: usize,
    pub difficulty: Difficulty,
}

impl BacktestOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            start: config.generator.momentum.baseline_window,
            sample_size: config.sample_size,
            prediction_count: config.prediction_count,
            lookback: config.lookback,
            difficulty: config.difficulty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub method: StrategyKind,
    pub rounds: usize,
    pub total_hits: usize,
    pub average_hits: f64,
    pub best_hits: usize,
    /// Somme des multiplicateurs obtenus.
    pub total_profit: f64,
    /// Gain moins une mise unitaire par partie.
    pub net_profit: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub rounds_scored: usize,
    /// Sur toute la période, par gain net décroissant.
    pub summaries: Vec<MethodSummary>,
    /// Fenêtre glissante à la fin de la période.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Walk-forward : pour chaque partie t >= start, les méthodes prédisent à
/// partir de history[t - sample_size .. t] uniquement, puis la partie t
/// est confrontée aux prédictions. Aucune donnée future n'est utilisée.
pub fn walk_forward(
    history: &[Round],
    methods: &[StrategyKind],
    generator: &GeneratorConfig,
    options: &BacktestOptions,
    payouts: &dyn PayoutLookup,
    mut on_step: impl FnMut(usize, usize),
) -> BacktestReport {
    let mut tracker = ComparisonTracker::new(methods, options.lookback, options.difficulty);
    let mut summaries: Vec<MethodSummary> = methods
        .iter()
        .map(|&method| MethodSummary {
            method,
            rounds: 0,
            total_hits: 0,
            average_hits: 0.0,
            best_hits: 0,
            total_profit: 0.0,
            net_profit: 0.0,
        })
        .collect();

    let start = options.start.max(1);
    let total = history.len().saturating_sub(start);
    let mut rounds_scored = 0usize;

    for t in start..history.len() {
        let train = &history[t.saturating_sub(options.sample_size)..t];
        let mut config = generator.clone();
        config.auto_delegate = tracker.best_method();

        let predictions = methods
            .iter()
            .map(|&m| (m, generators::generate(m, options.prediction_count, train, &config)))
            .collect();
        tracker.capture(predictions);

        if let Some(point) = tracker.track_round(t, history[t].drawn(), payouts) {
            for result in &point.results {
                if let Some(summary) = summaries.iter_mut().find(|s| s.method == result.method) {
                    summary.rounds += 1;
                    summary.total_hits += result.hits;
                    summary.best_hits = summary.best_hits.max(result.hits);
                    summary.total_profit += result.profit;
                }
            }
            rounds_scored += 1;
        }
        on_step(t + 1 - start, total);
    }

    for summary in &mut summaries {
        if summary.rounds > 0 {
            summary.average_hits = summary.total_hits as f64 / summary.rounds as f64;
        }
        summary.net_profit = summary.total_profit - summary.rounds as f64;
    }
    summaries.sort_by(|a, b| b.net_profit.total_cmp(&a.net_profit));

    if rounds_scored == 0 {
        log::warn!(
            "Backtest : historique trop court ({} partie(s), début à {})",
            history.len(),
            start
        );
    }

    BacktestReport {
        rounds_scored,
        summaries,
        leaderboard: tracker.leaderboard(),
    }
}
