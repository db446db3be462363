//! Multiplicateurs de gain par difficulté, taille de grille et nombre de numéros trouvés.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    Medium,
    #[default]
    High,
}

impl Difficulty {
    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Low => "low",
            Difficulty::Medium => "medium",
            Difficulty::High => "high",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait PayoutLookup: Send + Sync {
    /// Multiplicateur pour `hits` numéros trouvés sur une grille de
    /// `pattern_size` numéros ; `None` si la table ne le prévoit pas.
    fn multiplier(&self, difficulty: Difficulty, pattern_size: usize, hits: usize) -> Option<f64>;
}

/// Table chargée depuis un JSON `{difficulté: {taille: {trouvés: multiplicateur}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutTable {
    tiers: HashMap<String, HashMap<usize, HashMap<usize, f64>>>,
}

impl PayoutTable {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Table de gains invalide")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        Self::from_json(&content)
    }

    pub fn insert(&mut self, difficulty: Difficulty, pattern_size: usize, hits: usize, multiplier: f64) {
        self.tiers
            .entry(difficulty.name().to_string())
            .or_default()
            .entry(pattern_size)
            .or_default()
            .insert(hits, multiplier);
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl PayoutLookup for PayoutTable {
    fn multiplier(&self, difficulty: Difficulty, pattern_size: usize, hits: usize) -> Option<f64> {
        self.tiers
            .get(difficulty.name())?
            .get(&pattern_size)?
            .get(&hits)
            .copied()
    }
}

/// Gain d'une grille : le multiplicateur, 0 s'il n'existe pas.
pub fn profit(payouts: &dyn PayoutLookup, difficulty: Difficulty, pattern_size: usize, hits: usize) -> f64 {
    payouts.multiplier(difficulty, pattern_size, hits).unwrap_or(0.0)
}
