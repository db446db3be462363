//! Combinaisons de k numéros apparues ensemble dans les tirages récents.

pub mod buildup;
pub mod cache;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kenostat_db::models::Round;

/// En dessous, pas d'analyse.
pub const MIN_SAMPLE: usize = 10;
pub const MAX_PATTERN_SIZE: usize = 10;
/// Décroissance par partie du score « hot ».
pub const HOT_DECAY: f64 = 0.98;
pub const DEFAULT_TOP_N: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Frequency,
    Recent,
    Hot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    /// Index absolu dans l'historique.
    pub round_index: usize,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// Trié croissant.
    pub numbers: Vec<u8>,
    pub occurrences: Vec<Occurrence>,
    pub hot_score: f64,
}

impl Pattern {
    pub fn count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn last_seen(&self) -> Option<usize> {
        self.occurrences.iter().map(|o| o.round_index).max()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternStats {
    pub total_combinations: usize,
    pub average_occurrences: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternReport {
    pub patterns: Vec<Pattern>,
    pub stats: PatternStats,
}

/// Appelle `f` pour chaque sous-ensemble de taille `k` de `items`, dans
/// l'ordre lexicographique des indices.
pub fn for_each_combination(items: &[u8], k: usize, mut f: impl FnMut(&[u8])) {
    if k == 0 || k > items.len() {
        return;
    }
    let n = items.len();
    let mut idx: Vec<usize> = (0..k).collect();
    let mut combo = vec![0u8; k];
    loop {
        for (slot, &i) in combo.iter_mut().zip(&idx) {
            *slot = items[i];
        }
        f(&combo);

        // Avancer l'indice le plus à droite qui peut encore bouger
        let mut i = k;
        while i > 0 && idx[i - 1] == n - k + i - 1 {
            i -= 1;
        }
        if i == 0 {
            return;
        }
        idx[i - 1] += 1;
        for j in i..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Dénombre toutes les combinaisons de `k` numéros tirés ensemble.
/// `base_index` est l'index absolu de `sample[0]`. Le résultat est trié
/// par fréquence, sans limite de taille.
pub fn tally_patterns(k: usize, sample: &[Round], base_index: usize) -> PatternReport {
    if sample.len() < MIN_SAMPLE || k == 0 || k > MAX_PATTERN_SIZE {
        return PatternReport {
            patterns: Vec::new(),
            stats: PatternStats {
                sample_size: sample.len(),
                ..PatternStats::default()
            },
        };
    }

    let last_index = base_index + sample.len() - 1;
    let mut found: HashMap<Vec<u8>, Pattern> = HashMap::new();
    for (offset, round) in sample.iter().enumerate() {
        let round_index = base_index + offset;
        let weight = HOT_DECAY.powi((last_index - round_index) as i32);
        for_each_combination(round.drawn(), k, |combo| {
            let pattern = found.entry(combo.to_vec()).or_insert_with(|| Pattern {
                numbers: combo.to_vec(),
                occurrences: Vec::new(),
                hot_score: 0.0,
            });
            pattern.occurrences.push(Occurrence {
                round_index,
                time: round.time(),
            });
            pattern.hot_score += weight;
        });
    }

    let total_occurrences: usize = found.values().map(Pattern::count).sum();
    let stats = PatternStats {
        total_combinations: found.len(),
        average_occurrences: if found.is_empty() {
            0.0
        } else {
            total_occurrences as f64 / found.len() as f64
        },
        sample_size: sample.len(),
    };

    let mut patterns: Vec<Pattern> = found.into_values().collect();
    sort_patterns(&mut patterns, SortMode::Frequency);
    PatternReport { patterns, stats }
}

pub fn sort_patterns(patterns: &mut [Pattern], mode: SortMode) {
    match mode {
        SortMode::Frequency => patterns.sort_by(|a, b| {
            b.count().cmp(&a.count()).then_with(|| a.numbers.cmp(&b.numbers))
        }),
        SortMode::Recent => patterns.sort_by(|a, b| {
            b.last_seen()
                .cmp(&a.last_seen())
                .then_with(|| b.count().cmp(&a.count()))
                .then_with(|| a.numbers.cmp(&b.numbers))
        }),
        SortMode::Hot => patterns.sort_by(|a, b| {
            b.hot_score
                .total_cmp(&a.hot_score)
                .then_with(|| b.count().cmp(&a.count()))
                .then_with(|| a.numbers.cmp(&b.numbers))
        }),
    }
}

/// Tri puis coupe aux `top_n` premiers ; les statistiques portent sur le
/// dénombrement complet.
pub fn rank_patterns(tally: &PatternReport, mode: SortMode, top_n: usize) -> PatternReport {
    let mut patterns = tally.patterns.clone();
    sort_patterns(&mut patterns, mode);
    patterns.truncate(top_n);
    PatternReport {
        patterns,
        stats: tally.stats.clone(),
    }
}

pub fn find_patterns(
    k: usize,
    sample: &[Round],
    base_index: usize,
    mode: SortMode,
    top_n: usize,
) -> PatternReport {
    rank_patterns(&tally_patterns(k, sample, base_index), mode, top_n)
}
