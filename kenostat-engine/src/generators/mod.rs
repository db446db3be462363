pub mod frequency;
pub mod momentum;
pub mod shapes;

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use kenostat_db::models::{Round, DOMAIN_SIZE};
use crate::config::GeneratorConfig;

/// Un générateur : fonction pure de (count, échantillon, configuration).
/// `sample` va du plus ancien au plus récent.
pub type GeneratorFn = fn(usize, &[Round], &GeneratorConfig) -> Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Frequency,
    Cold,
    Mixed,
    Average,
    Momentum,
    Shapes,
    Auto,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Frequency,
        StrategyKind::Cold,
        StrategyKind::Mixed,
        StrategyKind::Average,
        StrategyKind::Momentum,
        StrategyKind::Shapes,
        StrategyKind::Auto,
    ];

    /// Méthodes suivies par le comparateur. `auto` n'y figure pas :
    /// il délègue à l'une d'elles.
    pub const TRACKED: [StrategyKind; 6] = [
        StrategyKind::Frequency,
        StrategyKind::Cold,
        StrategyKind::Mixed,
        StrategyKind::Average,
        StrategyKind::Momentum,
        StrategyKind::Shapes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Frequency => "frequency",
            StrategyKind::Cold => "cold",
            StrategyKind::Mixed => "mixed",
            StrategyKind::Average => "average",
            StrategyKind::Momentum => "momentum",
            StrategyKind::Shapes => "shapes",
            StrategyKind::Auto => "auto",
        }
    }

    pub fn generator(&self) -> GeneratorFn {
        match self {
            StrategyKind::Frequency => frequency::hot,
            StrategyKind::Cold => frequency::cold,
            StrategyKind::Mixed => frequency::mixed,
            StrategyKind::Average => frequency::average,
            StrategyKind::Momentum => momentum::generate,
            StrategyKind::Shapes => shapes::generate,
            StrategyKind::Auto => auto,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        match StrategyKind::ALL.iter().find(|k| k.name() == wanted) {
            Some(kind) => Ok(*kind),
            None => bail!("Stratégie inconnue : '{}'", s),
        }
    }
}

/// Produit au plus `min(count, DOMAIN_SIZE)` numéros distincts dans [1, DOMAIN_SIZE].
pub fn generate(kind: StrategyKind, count: usize, sample: &[Round], config: &GeneratorConfig) -> Vec<u8> {
    let count = count.min(DOMAIN_SIZE as usize);
    if count == 0 {
        return Vec::new();
    }
    let mut picks = (kind.generator())(count, sample, config);
    picks.truncate(count);
    picks
}

/// Délègue à la méthode résolue par l'appelant ; `frequency` à défaut.
fn auto(count: usize, sample: &[Round], config: &GeneratorConfig) -> Vec<u8> {
    let delegate = config
        .auto_delegate
        .filter(|k| *k != StrategyKind::Auto)
        .unwrap_or(StrategyKind::Frequency);
    (delegate.generator())(count, sample, config)
}

/// Fréquence d'apparition de chaque numéro, indexée par `numéro - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: Vec<u32>,
}

impl FrequencyTable {
    pub fn from_sample(sample: &[Round]) -> Self {
        let mut counts = vec![0u32; DOMAIN_SIZE as usize];
        for round in sample {
            for &n in round.drawn() {
                counts[(n - 1) as usize] += 1;
            }
        }
        Self { counts }
    }

    pub fn count(&self, number: u8) -> u32 {
        self.counts[(number - 1) as usize]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    fn observed(&self) -> Vec<u8> {
        (1..=DOMAIN_SIZE).filter(|&n| self.count(n) > 0).collect()
    }

    fn unobserved(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=DOMAIN_SIZE).filter(|&n| self.count(n) == 0)
    }

    /// Numéros observés par fréquence décroissante (égalité : plus petit
    /// numéro d'abord), puis les numéros jamais tirés.
    pub fn hot_ranking(&self) -> Vec<u8> {
        let mut ranking = self.observed();
        ranking.sort_by(|&a, &b| self.count(b).cmp(&self.count(a)).then(a.cmp(&b)));
        ranking.extend(self.unobserved());
        ranking
    }

    /// Numéros observés par fréquence croissante, puis les numéros jamais tirés.
    pub fn cold_ranking(&self) -> Vec<u8> {
        let mut ranking = self.observed();
        ranking.sort_by(|&a, &b| self.count(a).cmp(&self.count(b)).then(a.cmp(&b)));
        ranking.extend(self.unobserved());
        ranking
    }
}

/// Complète `picks` avec `ranking` sans doublon jusqu'à `count` numéros.
pub(crate) fn fill_from(picks: &mut Vec<u8>, ranking: &[u8], count: usize) {
    for &n in ranking {
        if picks.len() >= count {
            break;
        }
        if !picks.contains(&n) {
            picks.push(n);
        }
    }
}

#[cfg(test)]
pub(crate) fn rounds_of(draws: &[&[u8]]) -> Vec<Round> {
    use chrono::{DateTime, Duration, Utc};
    draws
        .iter()
        .enumerate()
        .map(|(i, d)| Round::new(d, &[], DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(i as i64)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kenostat_db::models::make_test_rounds;

    fn assert_valid(picks: &[u8], count: usize) {
        assert_eq!(picks.len(), count.min(DOMAIN_SIZE as usize));
        let mut sorted = picks.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), picks.len(), "doublon dans {:?}", picks);
        assert!(picks.iter().all(|&n| (1..=DOMAIN_SIZE).contains(&n)));
    }

    #[test]
    fn test_all_strategies_valid() {
        let rounds = make_test_rounds(120);
        let config = GeneratorConfig::default();
        for kind in StrategyKind::ALL {
            for count in [1, 5, 10, 40, 55] {
                let picks = generate(kind, count, &rounds, &config);
                assert_valid(&picks, count);
            }
        }
    }

    #[test]
    fn test_all_strategies_on_empty_sample() {
        let config = GeneratorConfig::default();
        for kind in StrategyKind::ALL {
            let picks = generate(kind, 10, &[], &config);
            assert_valid(&picks, 10);
        }
    }

    #[test]
    fn test_zero_count_is_empty() {
        let rounds = make_test_rounds(20);
        for kind in StrategyKind::ALL {
            assert!(generate(kind, 0, &rounds, &GeneratorConfig::default()).is_empty());
        }
    }

    #[test]
    fn test_generators_are_deterministic() {
        let rounds = make_test_rounds(80);
        let config = GeneratorConfig::default();
        for kind in StrategyKind::ALL {
            assert_eq!(
                generate(kind, 10, &rounds, &config),
                generate(kind, 10, &rounds, &config),
                "{kind} non déterministe"
            );
        }
    }

    #[test]
    fn test_auto_delegates() {
        let rounds = rounds_of(&[&[1, 5, 9], &[5, 9, 14], &[1, 9, 20]]);
        let mut config = GeneratorConfig::default();
        assert_eq!(
            generate(StrategyKind::Auto, 2, &rounds, &config),
            generate(StrategyKind::Frequency, 2, &rounds, &config)
        );
        config.auto_delegate = Some(StrategyKind::Cold);
        assert_eq!(generate(StrategyKind::Auto, 2, &rounds, &config), vec![14, 20]);
        config.auto_delegate = Some(StrategyKind::Auto);
        assert_eq!(generate(StrategyKind::Auto, 2, &rounds, &config), vec![9, 1]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("frequency".parse::<StrategyKind>().unwrap(), StrategyKind::Frequency);
        assert_eq!(" Momentum ".parse::<StrategyKind>().unwrap(), StrategyKind::Momentum);
        assert!("bogus".parse::<StrategyKind>().is_err());
        for kind in StrategyKind::ALL {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_rankings_pad_with_unobserved() {
        let rounds = rounds_of(&[&[3], &[3, 7]]);
        let table = FrequencyTable::from_sample(&rounds);
        let hot = table.hot_ranking();
        assert_eq!(&hot[..3], &[3, 7, 1]);
        assert_eq!(hot.len(), DOMAIN_SIZE as usize);
        let cold = table.cold_ranking();
        assert_eq!(&cold[..3], &[7, 3, 1]);
    }
}
