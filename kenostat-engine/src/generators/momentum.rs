use kenostat_db::models::Round;

use super::{fill_from, frequency, FrequencyTable};
use crate::config::GeneratorConfig;
use crate::momentum::{rank_by_ratio, MomentumDetector, MomentumReading};

/// Numéros dont le ratio dépasse le seuil, limités à `pool_size`,
/// complétés par le classement de fréquence.
pub fn generate(count: usize, sample: &[Round], config: &GeneratorConfig) -> Vec<u8> {
    let settings = &config.momentum;
    let mut states = match MomentumDetector::from_config(settings).read(sample) {
        MomentumReading::Windowed(states) => states,
        MomentumReading::Degraded(_) => return frequency::hot(count, sample, config),
    };
    rank_by_ratio(&mut states);

    let mut picks: Vec<u8> = states
        .iter()
        .filter(|s| s.ratio > settings.threshold)
        .take(settings.pool_size)
        .take(count)
        .map(|s| s.number)
        .collect();
    if picks.len() < count {
        fill_from(&mut picks, &FrequencyTable::from_sample(sample).hot_ranking(), count);
    }
    picks
}
