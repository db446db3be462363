//! Évaluation à horizon : une prédiction est gardée `refresh` parties et
//! l'on regarde si elle sort entièrement dans les `horizon` parties qui
//! suivent son émission.

use std::cmp::Ordering;

use serde::Serialize;

use kenostat_db::models::Round;

use crate::config::{EngineConfig, GeneratorConfig};
use crate::generators::{self, StrategyKind};
use crate::payout::{self, Difficulty, PayoutLookup};

pub const DEFAULT_HORIZON: usize = 30;
pub const DEFAULT_REFRESH: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    /// 1 = sortie complète dès la partie suivante.
    pub rounds_to_hit: Option<usize>,
    /// Meilleur gain net sur l'horizon : multiplicateur moins une mise par
    /// partie jouée jusque-là.
    pub profit: f64,
}

impl Completion {
    pub fn completed(&self) -> bool {
        self.rounds_to_hit.is_some()
    }

    /// La grille rembourse au moins ses mises.
    pub fn maintaining(&self) -> bool {
        self.profit >= 0.0
    }
}

/// Joue `picks` sur chaque partie de `future` jusqu'à la première sortie
/// complète. Sans sortie complète, retient la meilleure sortie partielle
/// payante ; à défaut le gain vaut `-future.len()`.
pub fn evaluate_completion(
    picks: &[u8],
    future: &[Round],
    payouts: &dyn PayoutLookup,
    difficulty: Difficulty,
) -> Completion {
    let size = picks.len();
    let hits_in = |round: &Round| picks.iter().filter(|&&n| round.is_drawn(n)).count();

    if size > 0 {
        if let Some(ahead) = future.iter().position(|r| hits_in(r) == size) {
            let played = ahead + 1;
            return Completion {
                rounds_to_hit: Some(played),
                profit: payout::profit(payouts, difficulty, size, size) - played as f64,
            };
        }
    }

    let mut best = -(future.len() as f64);
    for (ahead, round) in future.iter().enumerate() {
        let hits = hits_in(round);
        if hits == 0 {
            continue;
        }
        if let Some(multiplier) = payouts.multiplier(difficulty, size, hits).filter(|m| *m > 0.0) {
            best = best.max(multiplier - (ahead + 1) as f64);
        }
    }
    Completion {
        rounds_to_hit: None,
        profit: best,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionStats {
    pub predictions: usize,
    pub completions: usize,
    pub maintaining: usize,
    pub total_rounds_to_hit: usize,
    pub total_profit: f64,
}

impl CompletionStats {
    pub fn record(&mut self, completion: &Completion) {
        self.predictions += 1;
        if let Some(rounds) = completion.rounds_to_hit {
            self.completions += 1;
            self.total_rounds_to_hit += rounds;
        }
        if completion.maintaining() {
            self.maintaining += 1;
        }
        self.total_profit += completion.profit;
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.completions, self.predictions)
    }

    pub fn maintaining_rate(&self) -> f64 {
        ratio(self.maintaining, self.predictions)
    }

    pub fn average_rounds_to_hit(&self) -> Option<f64> {
        (self.completions > 0).then(|| self.total_rounds_to_hit as f64 / self.completions as f64)
    }

    pub fn average_profit(&self) -> f64 {
        if self.predictions == 0 {
            0.0
        } else {
            self.total_profit / self.predictions as f64
        }
    }

    /// Meilleur taux de réussite d'abord, puis sortie la plus rapide.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .success_rate()
            .total_cmp(&self.success_rate())
            .then_with(|| {
                let a = self.average_rounds_to_hit().unwrap_or(f64::INFINITY);
                let b = other.average_rounds_to_hit().unwrap_or(f64::INFINITY);
                a.total_cmp(&b)
            })
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[derive(Debug, Clone)]
pub struct LookaheadOptions {
    pub start: usize,
    pub sample_size: usize,
    pub prediction_count: usize,
    pub horizon: usize,
    /// Une nouvelle prédiction toutes les `refresh` parties.
    pub refresh: usize,
    pub difficulty: Difficulty,
}

impl LookaheadOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            start: config.generator.momentum.baseline_window,
            sample_size: config.sample_size,
            prediction_count: config.prediction_count,
            horizon: DEFAULT_HORIZON,
            refresh: DEFAULT_REFRESH,
            difficulty: config.difficulty,
        }
    }

    /// Points d'émission : `t` tel que `history[t..t + horizon]` existe.
    pub fn emission_points(&self, history_len: usize) -> impl Iterator<Item = usize> {
        (self.start.max(1)..history_len.saturating_sub(self.horizon)).step_by(self.refresh.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodCompletion {
    pub method: StrategyKind,
    pub stats: CompletionStats,
    /// Nombre d'émissions différentes de la précédente.
    pub pattern_changes: usize,
}

/// Pour chaque point d'émission `t`, chaque méthode prédit à partir de
/// `history[t - sample_size .. t]`, puis la prédiction est jouée sur
/// `history[t .. t + horizon]`.
pub fn evaluate_methods(
    history: &[Round],
    methods: &[StrategyKind],
    generator: &GeneratorConfig,
    options: &LookaheadOptions,
    payouts: &dyn PayoutLookup,
    mut on_step: impl FnMut(usize, usize),
) -> Vec<MethodCompletion> {
    let mut results: Vec<MethodCompletion> = methods
        .iter()
        .map(|&method| MethodCompletion {
            method,
            stats: CompletionStats::default(),
            pattern_changes: 0,
        })
        .collect();
    let mut last: Vec<Vec<u8>> = vec![Vec::new(); methods.len()];

    let points: Vec<usize> = options.emission_points(history.len()).collect();
    for (step, &t) in points.iter().enumerate() {
        let train = &history[t.saturating_sub(options.sample_size)..t];
        let future = &history[t..t + options.horizon];
        for (i, result) in results.iter_mut().enumerate() {
            let picks = generators::generate(result.method, options.prediction_count, train, generator);
            if picks != last[i] {
                result.pattern_changes += 1;
            }
            let completion = evaluate_completion(&picks, future, payouts, options.difficulty);
            result.stats.record(&completion);
            last[i] = picks;
        }
        on_step(step + 1, points.len());
    }

    if points.is_empty() {
        log::warn!(
            "Évaluation à horizon : historique trop court ({} partie(s), début à {}, horizon {})",
            history.len(),
            options.start,
            options.horizon
        );
    }

    results.sort_by(|a, b| a.stats.rank_cmp(&b.stats));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::rounds_of;
    use crate::payout::PayoutTable;
    use kenostat_db::models::make_test_rounds;

    fn payouts() -> PayoutTable {
        let mut table = PayoutTable::default();
        table.insert(Difficulty::High, 2, 2, 10.0);
        table.insert(Difficulty::High, 3, 2, 3.0);
        table
    }

    #[test]
    fn test_full_hit_counts_rounds_played() {
        let future = rounds_of(&[&[5], &[1, 2, 3]]);
        let c = evaluate_completion(&[1, 2], &future, &payouts(), Difficulty::High);
        assert_eq!(c.rounds_to_hit, Some(2));
        assert!((c.profit - 8.0).abs() < 1e-12);
        assert!(c.maintaining());
    }

    #[test]
    fn test_best_partial_hit_when_never_complete() {
        let future = rounds_of(&[&[1], &[9], &[1, 2]]);
        let c = evaluate_completion(&[1, 2, 3], &future, &payouts(), Difficulty::High);
        assert!(!c.completed());
        // 2 trouvés à la 3e partie : 3.0 - 3 mises
        assert!(c.profit.abs() < 1e-12);
        assert!(c.maintaining());
    }

    #[test]
    fn test_no_payout_loses_every_stake() {
        let future = rounds_of(&[&[9], &[8]]);
        let c = evaluate_completion(&[1, 2], &future, &payouts(), Difficulty::High);
        assert_eq!(c, Completion { rounds_to_hit: None, profit: -2.0 });
        assert!(!c.maintaining());
    }

    #[test]
    fn test_stats_rates() {
        let mut stats = CompletionStats::default();
        stats.record(&Completion { rounds_to_hit: Some(4), profit: 2.0 });
        stats.record(&Completion { rounds_to_hit: Some(2), profit: -1.0 });
        stats.record(&Completion { rounds_to_hit: None, profit: -30.0 });
        stats.record(&Completion { rounds_to_hit: None, profit: 0.0 });
        assert!((stats.success_rate() - 0.5).abs() < 1e-12);
        assert!((stats.maintaining_rate() - 0.5).abs() < 1e-12);
        assert_eq!(stats.average_rounds_to_hit(), Some(3.0));
        assert!((stats.average_profit() + 7.25).abs() < 1e-12);
        assert_eq!(CompletionStats::default().average_rounds_to_hit(), None);
    }

    fn options(refresh: usize) -> LookaheadOptions {
        LookaheadOptions {
            start: 50,
            sample_size: 50,
            prediction_count: 5,
            horizon: 30,
            refresh,
            difficulty: Difficulty::High,
        }
    }

    #[test]
    fn test_emission_every_refresh_rounds() {
        let history = make_test_rounds(120);
        let mut steps = 0;
        let results = evaluate_methods(
            &history,
            &[StrategyKind::Frequency, StrategyKind::Cold],
            &GeneratorConfig::default(),
            &options(5),
            &payouts(),
            |_, _| steps += 1,
        );
        // t = 50, 55, ..., 85
        assert_eq!(steps, 8);
        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.stats.predictions, 8);
            assert!(r.stats.completions <= r.stats.predictions);
            assert!(r.pattern_changes >= 1 && r.pattern_changes <= 8);
        }
        assert_ne!(results[0].stats.rank_cmp(&results[1].stats), Ordering::Greater);

        let sparse = evaluate_methods(&history, &[StrategyKind::Frequency], &GeneratorConfig::default(),
            &options(10), &payouts(), |_, _| {});
        assert_eq!(sparse[0].stats.predictions, 4);
    }

    #[test]
    fn test_history_shorter_than_horizon() {
        let history = make_test_rounds(70);
        let results = evaluate_methods(&history, &StrategyKind::TRACKED, &GeneratorConfig::default(),
            &options(5), &payouts(), |_, _| {});
        assert!(results.iter().all(|r| r.stats.predictions == 0 && r.pattern_changes == 0));
    }
}
