//! Détection de momentum : taux d'apparition récent comparé au taux de base.

use kenostat_db::models::{Round, Trend, DOMAIN_SIZE};

use crate::config::MomentumConfig;
use crate::generators::FrequencyTable;

/// Remplace un comptage de base nul pour garder un ratio fini.
pub const BASELINE_EPSILON: f64 = 0.01;
/// En dessous, la fenêtre de base n'est pas significative.
pub const MIN_BASELINE_ROUNDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumState {
    pub number: u8,
    pub recent_rate: f64,
    pub baseline_rate: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MomentumReading {
    /// Un état par numéro, de 1 à DOMAIN_SIZE.
    Windowed(Vec<MomentumState>),
    /// Historique trop court : simple table de fréquences.
    Degraded(FrequencyTable),
}

/// Ratio de momentum d'un numéro entre deux fenêtres quelconques.
pub fn ratio_between(number: u8, recent: &[Round], baseline: &[Round]) -> MomentumState {
    let recent_count = recent.iter().filter(|r| r.is_drawn(number)).count() as f64;
    let baseline_count = baseline.iter().filter(|r| r.is_drawn(number)).count() as f64;

    let recent_rate = recent_count / recent.len().max(1) as f64;
    let baseline_count = if baseline_count == 0.0 { BASELINE_EPSILON } else { baseline_count };
    let baseline_rate = baseline_count / baseline.len().max(1) as f64;

    MomentumState {
        number,
        recent_rate,
        baseline_rate,
        ratio: recent_rate / baseline_rate,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MomentumDetector {
    detection_window: usize,
    baseline_window: usize,
}

impl MomentumDetector {
    pub fn new(detection_window: usize, baseline_window: usize) -> Self {
        Self {
            detection_window: detection_window.max(1),
            baseline_window,
        }
    }

    pub fn from_config(config: &MomentumConfig) -> Self {
        Self::new(config.detection_window, config.baseline_window)
    }

    /// Fenêtres prises à la fin de l'échantillon (les plus récentes),
    /// bornées par sa taille. La fenêtre récente est incluse dans la base.
    pub fn read(&self, sample: &[Round]) -> MomentumReading {
        let baseline = &sample[sample.len().saturating_sub(self.baseline_window)..];
        if baseline.len() < MIN_BASELINE_ROUNDS {
            log::debug!(
                "Momentum : {} partie(s) de base, repli sur les fréquences",
                baseline.len()
            );
            return MomentumReading::Degraded(FrequencyTable::from_sample(sample));
        }
        let recent = &sample[sample.len().saturating_sub(self.detection_window)..];

        MomentumReading::Windowed(
            (1..=DOMAIN_SIZE)
                .map(|n| ratio_between(n, recent, baseline))
                .collect(),
        )
    }
}

/// Tri par ratio décroissant, égalité : plus petit numéro d'abord.
pub fn rank_by_ratio(states: &mut [MomentumState]) {
    states.sort_by(|a, b| b.ratio.total_cmp(&a.ratio).then(a.number.cmp(&b.number)));
}

pub fn classify(ratio: f64, threshold: f64) -> Trend {
    if ratio >= threshold {
        Trend::Up
    } else if ratio <= 1.0 / threshold {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

/// Tendance de chaque numéro, indexée par `numéro - 1`.
pub fn trends(sample: &[Round], config: &MomentumConfig) -> Vec<Trend> {
    match MomentumDetector::from_config(config).read(sample) {
        MomentumReading::Windowed(states) => states
            .iter()
            .map(|s| classify(s.ratio, config.threshold))
            .collect(),
        MomentumReading::Degraded(_) => vec![Trend::Neutral; DOMAIN_SIZE as usize],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::rounds_of;
    use kenostat_db::models::make_test_rounds;

    #[test]
    fn test_equal_rates_give_ratio_one() {
        // 1 apparition sur 5 récentes, 10 sur 50 de base
        let recent = rounds_of(&[&[7], &[1], &[2], &[3], &[4]]);
        let baseline: Vec<Round> = (0..50)
            .map(|i| if i % 5 == 0 { vec![7u8] } else { vec![1u8] })
            .map(|d| Round::new(&d, &[], chrono::DateTime::<chrono::Utc>::UNIX_EPOCH))
            .collect();
        let state = ratio_between(7, &recent, &baseline);
        assert!((state.recent_rate - 0.2).abs() < 1e-12);
        assert!((state.baseline_rate - 0.2).abs() < 1e-12);
        assert!((state.ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_baseline_gives_large_finite_ratio() {
        let recent = rounds_of(&[&[7], &[1], &[1], &[1], &[1]]);
        let baseline = rounds_of(&vec![&[1u8][..]; 50]);
        let state = ratio_between(7, &recent, &baseline);
        assert!(state.ratio.is_finite());
        assert!((state.baseline_rate - BASELINE_EPSILON / 50.0).abs() < 1e-12);
        assert!((state.ratio - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_windows_do_not_divide_by_zero() {
        let state = ratio_between(3, &[], &[]);
        assert_eq!(state.recent_rate, 0.0);
        assert_eq!(state.ratio, 0.0);
    }

    #[test]
    fn test_detector_degrades_on_short_history() {
        let detector = MomentumDetector::new(5, 50);
        let rounds = make_test_rounds(4);
        assert!(matches!(detector.read(&rounds), MomentumReading::Degraded(_)));
    }

    #[test]
    fn test_detector_reads_every_number() {
        let detector = MomentumDetector::new(5, 50);
        let rounds = make_test_rounds(60);
        let MomentumReading::Windowed(states) = detector.read(&rounds) else {
            panic!("lecture dégradée inattendue");
        };
        assert_eq!(states.len(), DOMAIN_SIZE as usize);
        assert!(states.iter().all(|s| s.ratio.is_finite() && s.ratio >= 0.0));
    }

    #[test]
    fn test_recent_burst_ranks_first() {
        let mut draws: Vec<&[u8]> = vec![&[1u8, 2][..]; 45];
        draws.extend(vec![&[1, 2, 33][..]; 5]);
        let rounds = rounds_of(&draws);
        let MomentumReading::Windowed(mut states) = MomentumDetector::new(5, 50).read(&rounds) else {
            panic!("lecture dégradée inattendue");
        };
        rank_by_ratio(&mut states);
        assert_eq!(states[0].number, 33);
        assert!((states[0].ratio - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(2.0, 1.5), Trend::Up);
        assert_eq!(classify(0.5, 1.5), Trend::Down);
        assert_eq!(classify(1.0, 1.5), Trend::Neutral);
        assert_eq!(classify(1.5, 1.5), Trend::Up);
        assert_eq!(classify(1.0 / 1.5, 1.5), Trend::Down);
    }

    #[test]
    fn test_trends_neutral_when_degraded() {
        let trends = trends(&make_test_rounds(2), &MomentumConfig::default());
        assert!(trends.iter().all(|t| *t == Trend::Neutral));
    }
}
