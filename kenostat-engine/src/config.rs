use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use kenostat_db::history::{HistoryOptions, DEFAULT_CHUNK_SIZE};
use crate::generators::shapes::{Placement, ShapePattern};
use crate::generators::StrategyKind;
use crate::payout::Difficulty;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub detection_window: usize,
    pub baseline_window: usize,
    pub threshold: f64,
    pub pool_size: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            detection_window: 5,
            baseline_window: 50,
            threshold: 1.5,
            pool_size: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapesConfig {
    pub pattern: ShapePattern,
    pub placement: Placement,
    pub seed: u64,
}

impl Default for ShapesConfig {
    fn default() -> Self {
        Self {
            pattern: ShapePattern::Plus,
            placement: Placement::Hot,
            seed: 42,
        }
    }
}

/// Paramètres des générateurs. Sa forme sérialisée sert de signature
/// dans le cache des prédictions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub momentum: MomentumConfig,
    pub shapes: ShapesConfig,
    /// Méthode résolue pour `auto`, renseignée par le moteur.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delegate: Option<StrategyKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunk_size: usize,
    pub debounce_ms: u64,
    /// Nombre de parties récentes utilisées par les générateurs.
    pub sample_size: usize,
    pub prediction_count: usize,
    /// Fenêtre glissante du comparateur.
    pub lookback: usize,
    pub difficulty: Difficulty,
    pub pattern_ttl_secs: u64,
    pub generator: GeneratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            debounce_ms: 100,
            sample_size: 100,
            prediction_count: 10,
            lookback: 100,
            difficulty: Difficulty::High,
            pattern_ttl_secs: 300,
            generator: GeneratorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Configuration invalide dans {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }

    pub fn history_options(&self) -> HistoryOptions {
        HistoryOptions {
            chunk_size: self.chunk_size.max(1),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn pattern_ttl(&self) -> Duration {
        Duration::from_secs(self.pattern_ttl_secs)
    }
}
