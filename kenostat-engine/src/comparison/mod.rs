//! Suivi comparatif des méthodes : chaque partie est confrontée aux
//! prédictions capturées avant son tirage.

pub mod backtest;
pub mod lookahead;
pub mod optimize;

use std::collections::VecDeque;

use serde::Serialize;

use crate::generators::StrategyKind;
use crate::payout::{self, Difficulty, PayoutLookup};

pub const DEFAULT_LOOKBACK: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodResult {
    pub method: StrategyKind,
    pub predicted: Vec<u8>,
    pub hits: usize,
    pub count: usize,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonDataPoint {
    pub round_index: usize,
    pub difficulty: Difficulty,
    pub results: Vec<MethodResult>,
}

impl ComparisonDataPoint {
    pub fn result(&self, method: StrategyKind) -> Option<&MethodResult> {
        self.results.iter().find(|r| r.method == method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub method: StrategyKind,
    pub total_profit: f64,
    pub total_hits: usize,
    pub rounds: usize,
    pub average_hits: f64,
}

/// Prédictions en jeu et fenêtre glissante des résultats.
#[derive(Debug)]
pub struct ComparisonTracker {
    methods: Vec<StrategyKind>,
    lookback: usize,
    difficulty: Difficulty,
    in_play: Vec<(StrategyKind, Vec<u8>)>,
    points: VecDeque<ComparisonDataPoint>,
}

impl ComparisonTracker {
    pub fn new(methods: &[StrategyKind], lookback: usize, difficulty: Difficulty) -> Self {
        Self {
            methods: methods.to_vec(),
            lookback: lookback.max(1),
            difficulty,
            in_play: Vec::new(),
            points: VecDeque::new(),
        }
    }

    pub fn methods(&self) -> &[StrategyKind] {
        &self.methods
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    /// Remplace les prédictions en jeu pour la prochaine partie.
    pub fn capture(&mut self, predictions: Vec<(StrategyKind, Vec<u8>)>) {
        self.in_play = predictions
            .into_iter()
            .filter(|(method, _)| self.methods.contains(method))
            .collect();
    }

    pub fn in_play(&self) -> &[(StrategyKind, Vec<u8>)] {
        &self.in_play
    }

    /// Confronte les prédictions en jeu au tirage puis les retire du jeu.
    /// `None` si rien n'était en jeu.
    pub fn track_round(
        &mut self,
        round_index: usize,
        drawn: &[u8],
        payouts: &dyn PayoutLookup,
    ) -> Option<&ComparisonDataPoint> {
        if self.in_play.is_empty() {
            return None;
        }

        let results = std::mem::take(&mut self.in_play)
            .into_iter()
            .map(|(method, predicted)| {
                let hits = predicted.iter().filter(|n| drawn.contains(n)).count();
                MethodResult {
                    method,
                    hits,
                    count: predicted.len(),
                    profit: payout::profit(payouts, self.difficulty, predicted.len(), hits),
                    predicted,
                }
            })
            .collect();

        self.points.push_back(ComparisonDataPoint {
            round_index,
            difficulty: self.difficulty,
            results,
        });
        while self.points.len() > self.lookback {
            self.points.pop_front();
        }
        self.points.back()
    }

    pub fn points(&self) -> impl Iterator<Item = &ComparisonDataPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cumuls sur la fenêtre, par profit décroissant ; à égalité l'ordre
    /// des méthodes est conservé.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .methods
            .iter()
            .map(|&method| {
                let mut entry = LeaderboardEntry {
                    method,
                    total_profit: 0.0,
                    total_hits: 0,
                    rounds: 0,
                    average_hits: 0.0,
                };
                for result in self.points.iter().filter_map(|p| p.result(method)) {
                    entry.total_profit += result.profit;
                    entry.total_hits += result.hits;
                    entry.rounds += 1;
                }
                if entry.rounds > 0 {
                    entry.average_hits = entry.total_hits as f64 / entry.rounds as f64;
                }
                entry
            })
            .collect();
        entries.sort_by(|a, b| b.total_profit.total_cmp(&a.total_profit));
        entries
    }

    /// Meilleure méthode déléguable, `auto` exclu.
    pub fn best_method(&self) -> Option<StrategyKind> {
        if self.points.is_empty() {
            return None;
        }
        self.leaderboard()
            .into_iter()
            .map(|e| e.method)
            .find(|m| *m != StrategyKind::Auto)
    }

    pub fn clear(&mut self) {
        self.in_play.clear();
        self.points.clear();
    }
}
