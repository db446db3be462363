//! Recherche de paramètres par grille : chaque combinaison est rejouée avec
//! l'évaluation à horizon, en parallèle.

use rayon::prelude::*;
use serde::Serialize;

use kenostat_db::models::Round;

use super::lookahead::{evaluate_completion, evaluate_methods, CompletionStats, LookaheadOptions};
use crate::config::{GeneratorConfig, MomentumConfig};
use crate::generators::StrategyKind;
use crate::patterns::buildup::{find_buildups, BuildupFilter};
use crate::patterns::{rank_patterns, tally_patterns, SortMode};
use crate::payout::{Difficulty, PayoutLookup};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult<P> {
    pub params: P,
    pub stats: CompletionStats,
}

fn sort_results<P>(results: &mut [SweepResult<P>]) {
    results.sort_by(|a, b| a.stats.rank_cmp(&b.stats));
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentumCandidate {
    pub momentum: MomentumConfig,
    pub refresh: usize,
}

/// 4 * 4 * 4 * 3 = 192 combinaisons.
pub fn momentum_grid(pool_size: usize) -> Vec<MomentumCandidate> {
    let detections = [3, 5, 7, 10];
    let baselines = [25, 50, 75, 100];
    let thresholds = [1.2, 1.5, 2.0, 2.5];
    let refreshes = [5, 10, 20];

    let mut grid = Vec::with_capacity(192);
    for &detection_window in &detections {
        for &baseline_window in &baselines {
            for &threshold in &thresholds {
                for &refresh in &refreshes {
                    grid.push(MomentumCandidate {
                        momentum: MomentumConfig {
                            detection_window,
                            baseline_window,
                            threshold,
                            pool_size,
                        },
                        refresh,
                    });
                }
            }
        }
    }
    grid
}

/// Toutes les combinaisons démarrent au même point, après la plus longue
/// fenêtre de base de la grille.
pub fn sweep_momentum(
    history: &[Round],
    candidates: &[MomentumCandidate],
    generator: &GeneratorConfig,
    options: &LookaheadOptions,
    payouts: &dyn PayoutLookup,
    on_done: impl Fn() + Sync,
) -> Vec<SweepResult<MomentumCandidate>> {
    let longest = candidates
        .iter()
        .map(|c| c.momentum.baseline_window)
        .max()
        .unwrap_or(0);

    let mut results: Vec<SweepResult<MomentumCandidate>> = candidates
        .par_iter()
        .map(|candidate| {
            let generator = GeneratorConfig {
                momentum: candidate.momentum.clone(),
                ..generator.clone()
            };
            let options = LookaheadOptions {
                start: options.start.max(longest),
                sample_size: options.sample_size.max(candidate.momentum.baseline_window),
                refresh: candidate.refresh,
                ..options.clone()
            };
            let stats = evaluate_methods(history, &[StrategyKind::Momentum], &generator, &options, payouts, |_, _| {})
                .pop()
                .map(|m| m.stats)
                .unwrap_or_default();
            on_done();
            SweepResult {
                params: candidate.clone(),
                stats,
            }
        })
        .collect();

    sort_results(&mut results);
    results
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildupCandidate {
    /// Parties où l'on cherche les sorties partielles.
    pub sample: usize,
    pub filter: BuildupFilter,
}

/// Bornes de sorties partielles essayées selon la taille des combinaisons.
fn hit_ranges(pattern_size: usize) -> (Vec<usize>, Vec<usize>) {
    match pattern_size {
        3 => (vec![1, 2], vec![2, 3]),
        4 => (vec![1, 3], vec![3, 5]),
        5 => (vec![1, 4], vec![3, 4]),
        k @ 6..=10 => (vec![k - 3, k - 2, k - 1], vec![k - 2, k - 1]),
        k => {
            let top = k.saturating_sub(1);
            let mut min = vec![k.saturating_sub(2).max(1), top];
            min.dedup();
            (min, vec![top])
        }
    }
}

pub fn buildup_grid(pattern_size: usize) -> Vec<BuildupCandidate> {
    let samples = [5, 10, 25, 50, 75, 100, 150, 200];
    let not_hit_ins = [0, 50, 100, 1000];
    let (min_range, max_range) = hit_ranges(pattern_size);

    let mut grid = Vec::new();
    for &sample in &samples {
        for &min_hits in &min_range {
            for &max_hits in &max_range {
                if min_hits == 0 || min_hits > max_hits {
                    continue;
                }
                for &not_hit_in in &not_hit_ins {
                    grid.push(BuildupCandidate {
                        sample,
                        filter: BuildupFilter {
                            min_hits,
                            max_hits,
                            not_hit_in,
                            ..BuildupFilter::default()
                        },
                    });
                }
            }
        }
    }
    grid
}

#[derive(Debug, Clone)]
pub struct BuildupSweepOptions {
    pub pattern_size: usize,
    /// Parties servant à découvrir les combinaisons candidates.
    pub discovery: usize,
    pub candidates: usize,
    /// Parties où l'on cherche la dernière sortie complète.
    pub tracking: usize,
    /// Écart entre deux points d'évaluation.
    pub step: usize,
    pub horizon: usize,
    pub difficulty: Difficulty,
}

impl Default for BuildupSweepOptions {
    fn default() -> Self {
        Self {
            pattern_size: 5,
            discovery: 500,
            candidates: 100,
            tracking: 1000,
            step: 50,
            horizon: super::lookahead::DEFAULT_HORIZON,
            difficulty: Difficulty::High,
        }
    }
}

/// Aux points `t`, les montées détectées avant `t` sont jouées sur
/// `history[t .. t + horizon]`.
pub fn evaluate_buildups(
    history: &[Round],
    candidate: &BuildupCandidate,
    options: &BuildupSweepOptions,
    payouts: &dyn PayoutLookup,
) -> CompletionStats {
    let mut stats = CompletionStats::default();
    let start = options.discovery.max(candidate.sample).max(1);
    let end = history.len().saturating_sub(options.horizon);

    for t in (start..end).step_by(options.step.max(1)) {
        let discovery_start = t.saturating_sub(options.discovery);
        let tally = tally_patterns(options.pattern_size, &history[discovery_start..t], discovery_start);
        let ranked = rank_patterns(&tally, SortMode::Frequency, options.candidates);
        if ranked.patterns.is_empty() {
            continue;
        }

        let sample = &history[t.saturating_sub(candidate.sample)..t];
        let tracking = &history[t.saturating_sub(options.tracking)..t];
        let future = &history[t..t + options.horizon];
        for buildup in find_buildups(&ranked.patterns, sample, tracking, &candidate.filter) {
            stats.record(&evaluate_completion(&buildup.numbers, future, payouts, options.difficulty));
        }
    }
    stats
}

pub fn sweep_buildups(
    history: &[Round],
    candidates: &[BuildupCandidate],
    options: &BuildupSweepOptions,
    payouts: &dyn PayoutLookup,
    on_done: impl Fn() + Sync,
) -> Vec<SweepResult<BuildupCandidate>> {
    let mut results: Vec<SweepResult<BuildupCandidate>> = candidates
        .par_iter()
        .map(|candidate| {
            let stats = evaluate_buildups(history, candidate, options, payouts);
            on_done();
            SweepResult {
                params: candidate.clone(),
                stats,
            }
        })
        .collect();

    sort_results(&mut results);
    results
}
