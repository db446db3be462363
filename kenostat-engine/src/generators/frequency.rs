use kenostat_db::models::Round;

use super::{fill_from, FrequencyTable};
use crate::config::GeneratorConfig;

/// Les plus fréquents.
pub fn hot(count: usize, sample: &[Round], _config: &GeneratorConfig) -> Vec<u8> {
    let mut ranking = FrequencyTable::from_sample(sample).hot_ranking();
    ranking.truncate(count);
    ranking
}

/// Les moins fréquents parmi les numéros observés.
pub fn cold(count: usize, sample: &[Round], _config: &GeneratorConfig) -> Vec<u8> {
    let mut ranking = FrequencyTable::from_sample(sample).cold_ranking();
    ranking.truncate(count);
    ranking
}

/// ceil(count/2) chauds, le reste pris du côté froid sans doublon.
pub fn mixed(count: usize, sample: &[Round], _config: &GeneratorConfig) -> Vec<u8> {
    let table = FrequencyTable::from_sample(sample);
    let hot_ranking = table.hot_ranking();
    let mut picks: Vec<u8> = hot_ranking.iter().copied().take(count.div_ceil(2)).collect();
    fill_from(&mut picks, &table.cold_ranking(), count);
    fill_from(&mut picks, &hot_ranking, count);
    picks
}

/// Les numéros dont la fréquence est la plus proche de la médiane.
pub fn average(count: usize, sample: &[Round], _config: &GeneratorConfig) -> Vec<u8> {
    let table = FrequencyTable::from_sample(sample);
    let median = median(table.counts());

    let mut numbers: Vec<(u8, f64)> = table
        .counts()
        .iter()
        .enumerate()
        .map(|(i, &c)| ((i + 1) as u8, (c as f64 - median).abs()))
        .collect();
    numbers.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    numbers.into_iter().take(count).map(|(n, _)| n).collect()
}

/// Médiane ; pour un nombre pair de valeurs, moyenne des deux centrales.
pub fn median(values: &[u32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::rounds_of;

    fn scenario() -> Vec<Round> {
        rounds_of(&[&[1, 5, 9], &[5, 9, 14], &[1, 9, 20]])
    }

    #[test]
    fn test_hot_scenario() {
        assert_eq!(hot(2, &scenario(), &GeneratorConfig::default()), vec![9, 1]);
    }

    #[test]
    fn test_cold_scenario() {
        assert_eq!(cold(2, &scenario(), &GeneratorConfig::default()), vec![14, 20]);
    }

    #[test]
    fn test_mixed_takes_both_ends() {
        let picks = mixed(4, &scenario(), &GeneratorConfig::default());
        assert_eq!(picks, vec![9, 1, 14, 20]);
    }

    #[test]
    fn test_mixed_odd_count_favours_hot() {
        let picks = mixed(3, &scenario(), &GeneratorConfig::default());
        assert_eq!(picks, vec![9, 1, 14]);
    }

    #[test]
    fn test_mixed_without_duplicates_on_small_table() {
        let rounds = rounds_of(&[&[2, 4]]);
        let picks = mixed(4, &rounds, &GeneratorConfig::default());
        assert_eq!(picks.len(), 4);
        assert_eq!(&picks[..2], &[2, 4]);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[1, 3, 2]), 2.0);
        assert_eq!(median(&[4, 1, 2, 3]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_average_near_median() {
        // 35 numéros jamais tirés : médiane à 0
        let picks = average(3, &scenario(), &GeneratorConfig::default());
        assert_eq!(picks, vec![2, 3, 4]);
    }
}
