//! Montées en charge : combinaisons partiellement sorties récemment,
//! mais pas complètement ces dernières parties.

use serde::{Deserialize, Serialize};

use kenostat_db::models::Round;

use super::Pattern;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildupFilter {
    /// Bornes incluses du nombre de numéros sortis par partie.
    pub min_hits: usize,
    pub max_hits: usize,
    /// Part minimale des parties de l'échantillon présentant un
    /// recouvrement partiel.
    pub min_hit_rate: f64,
    /// Exclut les combinaisons sorties entièrement il y a moins de N
    /// parties. 0 désactive le filtre.
    pub not_hit_in: usize,
}

impl Default for BuildupFilter {
    fn default() -> Self {
        Self {
            min_hits: 3,
            max_hits: 4,
            min_hit_rate: 0.10,
            not_hit_in: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buildup {
    pub numbers: Vec<u8>,
    /// Recouvrement de chaque partie retenue.
    pub partial_hits: Vec<usize>,
    pub hit_rate: f64,
    /// Parties écoulées depuis la dernière sortie complète.
    pub last_full_hit: Option<usize>,
}

fn overlap(numbers: &[u8], round: &Round) -> usize {
    numbers.iter().filter(|&&n| round.is_drawn(n)).count()
}

/// Parties écoulées depuis la dernière partie contenant tous les numéros.
pub fn rounds_since_full_hit(numbers: &[u8], tracking: &[Round]) -> Option<usize> {
    tracking
        .iter()
        .rev()
        .position(|r| overlap(numbers, r) == numbers.len())
}

/// Garde, dans l'ordre reçu, les candidats qui passent le filtre.
pub fn find_buildups(
    candidates: &[Pattern],
    sample: &[Round],
    tracking: &[Round],
    filter: &BuildupFilter,
) -> Vec<Buildup> {
    if sample.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::new();
    for pattern in candidates {
        let partial_hits: Vec<usize> = sample
            .iter()
            .map(|r| overlap(&pattern.numbers, r))
            .filter(|m| (filter.min_hits..=filter.max_hits).contains(m))
            .collect();
        if partial_hits.is_empty() {
            continue;
        }

        let hit_rate = partial_hits.len() as f64 / sample.len() as f64;
        if hit_rate < filter.min_hit_rate {
            continue;
        }

        let last_full_hit = rounds_since_full_hit(&pattern.numbers, tracking);
        if filter.not_hit_in > 0 && last_full_hit.is_some_and(|ago| ago < filter.not_hit_in) {
            continue;
        }

        result.push(Buildup {
            numbers: pattern.numbers.clone(),
            partial_hits,
            hit_rate,
            last_full_hit,
        });
    }
    result
}
