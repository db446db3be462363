use kenostat_db::models::{NumberStats, Round, Trend, DOMAIN_SIZE};

use crate::config::MomentumConfig;
use crate::momentum;

/// Fréquence et écart (parties depuis la dernière sortie) de chaque numéro.
/// `sample` est chronologique ; un numéro jamais sorti a pour écart la
/// taille de l'échantillon.
pub fn compute_stats(sample: &[Round]) -> Vec<NumberStats> {
    let mut stats: Vec<NumberStats> = (1..=DOMAIN_SIZE)
        .map(|n| NumberStats {
            number: n,
            frequency: 0,
            gap: sample.len() as u32,
        })
        .collect();
    let mut seen = vec![false; DOMAIN_SIZE as usize];

    for (ago, round) in sample.iter().rev().enumerate() {
        for &n in round.drawn() {
            let idx = (n - 1) as usize;
            stats[idx].frequency += 1;
            if !seen[idx] {
                seen[idx] = true;
                stats[idx].gap = ago as u32;
            }
        }
    }
    stats
}

#[derive(Debug, Clone)]
pub struct NumberOverview {
    pub stats: NumberStats,
    pub trend: Trend,
}

pub fn number_overview(sample: &[Round], config: &MomentumConfig) -> Vec<NumberOverview> {
    let trends = momentum::trends(sample, config);
    compute_stats(sample)
        .into_iter()
        .zip(trends)
        .map(|(stats, trend)| NumberOverview { stats, trend })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::rounds_of;
    use kenostat_db::models::make_test_rounds;

    #[test]
    fn test_frequency_and_gap() {
        let rounds = rounds_of(&[&[1, 5, 9], &[5, 9, 14], &[1, 9, 20]]);
        let stats = compute_stats(&rounds);
        assert_eq!(stats.len(), DOMAIN_SIZE as usize);
        assert_eq!(stats[8].frequency, 3);
        assert_eq!(stats[8].gap, 0);
        assert_eq!(stats[4].frequency, 2);
        assert_eq!(stats[4].gap, 1);
        assert_eq!(stats[13].gap, 1);
        assert_eq!(stats[1].frequency, 0);
        assert_eq!(stats[1].gap, 3);
    }

    #[test]
    fn test_total_frequency() {
        let rounds = make_test_rounds(30);
        let total: u32 = compute_stats(&rounds).iter().map(|s| s.frequency).sum();
        assert_eq!(total, 300);
    }

    #[test]
    fn test_overview_covers_domain() {
        let overview = number_overview(&make_test_rounds(60), &MomentumConfig::default());
        assert_eq!(overview.len(), DOMAIN_SIZE as usize);
        assert_eq!(overview[0].stats.number, 1);
    }
}
