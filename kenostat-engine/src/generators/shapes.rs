//! Motifs géométriques posés sur le plateau 8x5.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use kenostat_db::models::{Round, BOARD_COLUMNS, BOARD_ROWS};

use super::{fill_from, FrequencyTable};
use crate::config::GeneratorConfig;
use crate::momentum::{MomentumDetector, MomentumReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShapePattern {
    #[default]
    Plus,
    Cross,
    Line,
    Zigzag,
    Square,
    Diagonal,
}

impl ShapePattern {
    /// Décalages (ligne, colonne) relatifs à l'ancre.
    pub fn offsets(&self) -> &'static [(i8, i8)] {
        match self {
            ShapePattern::Plus => &[(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)],
            ShapePattern::Cross => &[(0, 0), (-1, -1), (-1, 1), (1, -1), (1, 1)],
            ShapePattern::Line => &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)],
            ShapePattern::Zigzag => &[(0, 0), (1, 1), (0, 2), (1, 3), (0, 4), (1, 5)],
            ShapePattern::Square => &[(0, 0), (0, 1), (1, 0), (1, 1)],
            ShapePattern::Diagonal => &[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Random,
    #[default]
    Hot,
    Cold,
    Trending,
}

/// n -> (ligne, colonne), n dans [1, 40].
pub fn cell_of(number: u8) -> (u8, u8) {
    ((number - 1) / BOARD_COLUMNS, (number - 1) % BOARD_COLUMNS)
}

pub fn number_at(row: u8, col: u8) -> u8 {
    row * BOARD_COLUMNS + col + 1
}

/// Toutes les positions où le motif tient entièrement sur le plateau,
/// dans l'ordre de lecture des ancres.
pub fn placements(pattern: ShapePattern) -> Vec<Vec<u8>> {
    let mut result = Vec::new();
    for row in 0..BOARD_ROWS as i16 {
        for col in 0..BOARD_COLUMNS as i16 {
            let cells: Option<Vec<u8>> = pattern
                .offsets()
                .iter()
                .map(|&(dr, dc)| {
                    let (r, c) = (row + dr as i16, col + dc as i16);
                    let inside = (0..BOARD_ROWS as i16).contains(&r)
                        && (0..BOARD_COLUMNS as i16).contains(&c);
                    inside.then(|| number_at(r as u8, c as u8))
                })
                .collect();
            if let Some(cells) = cells {
                result.push(cells);
            }
        }
    }
    result
}

pub fn generate(count: usize, sample: &[Round], config: &GeneratorConfig) -> Vec<u8> {
    let settings = &config.shapes;
    let table = FrequencyTable::from_sample(sample);
    let candidates = placements(settings.pattern);

    let chosen = match settings.placement {
        Placement::Random => {
            let mut rng = StdRng::seed_from_u64(settings.seed ^ sample.len() as u64);
            candidates.get(rng.random_range(0..candidates.len().max(1))).cloned()
        }
        Placement::Hot => best_by(&candidates, |n| table.count(n) as f64),
        Placement::Cold => best_by(&candidates, |n| -(table.count(n) as f64)),
        Placement::Trending => match MomentumDetector::from_config(&config.momentum).read(sample) {
            MomentumReading::Windowed(states) => {
                best_by(&candidates, |n| states[(n - 1) as usize].ratio)
            }
            MomentumReading::Degraded(_) => best_by(&candidates, |n| table.count(n) as f64),
        },
    };

    let mut picks = chosen.unwrap_or_default();
    picks.truncate(count);
    fill_from(&mut picks, &table.hot_ranking(), count);
    picks
}

/// Placement au meilleur score cumulé ; égalité : premier dans l'ordre de lecture.
fn best_by(candidates: &[Vec<u8>], score: impl Fn(u8) -> f64) -> Option<Vec<u8>> {
    let mut best: Option<(&Vec<u8>, f64)> = None;
    for cells in candidates {
        let total: f64 = cells.iter().map(|&n| score(n)).sum();
        if best.map_or(true, |(_, s)| total > s) {
            best = Some((cells, total));
        }
    }
    best.map(|(cells, _)| cells.clone())
}
