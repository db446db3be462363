use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Taille du domaine : les numéros vont de 1 à 40.
pub const DOMAIN_SIZE: u8 = 40;
/// Nombre de numéros tirés à chaque partie.
pub const DRAW_SIZE: usize = 10;
/// Plateau de jeu : 8 colonnes x 5 lignes.
pub const BOARD_COLUMNS: u8 = 8;
pub const BOARD_ROWS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub payout: f64,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub pattern_size: usize,
}

/// Une partie terminée. Les ensembles sont triés et sans doublon ;
/// `hits` et `misses` sont dérivés, jamais stockés.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRound")]
pub struct Round {
    drawn: Vec<u8>,
    selected: Vec<u8>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payout: Option<Payout>,
}

impl Round {
    pub fn new(drawn: &[u8], selected: &[u8], time: DateTime<Utc>) -> Self {
        let (drawn, _) = normalize_numbers(drawn.iter().map(|&n| n as i64));
        let (selected, _) = normalize_numbers(selected.iter().map(|&n| n as i64));
        Self {
            drawn,
            selected,
            time,
            payout: None,
        }
    }

    pub fn with_payout(mut self, payout: Payout) -> Self {
        self.payout = Some(payout);
        self
    }

    pub fn drawn(&self) -> &[u8] {
        &self.drawn
    }

    pub fn selected(&self) -> &[u8] {
        &self.selected
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn payout(&self) -> Option<&Payout> {
        self.payout.as_ref()
    }

    pub fn is_drawn(&self, number: u8) -> bool {
        self.drawn.binary_search(&number).is_ok()
    }

    /// selected ∩ drawn
    pub fn hits(&self) -> Vec<u8> {
        self.selected
            .iter()
            .copied()
            .filter(|&n| self.is_drawn(n))
            .collect()
    }

    /// drawn \ selected
    pub fn misses(&self) -> Vec<u8> {
        self.drawn
            .iter()
            .copied()
            .filter(|n| self.selected.binary_search(n).is_err())
            .collect()
    }

    /// Décode une valeur persistée sans jamais échouer : une entrée illisible
    /// devient une partie vide plutôt que de rejeter tout l'historique.
    pub fn from_value_lossy(value: serde_json::Value) -> Self {
        match serde_json::from_value::<Round>(value) {
            Ok(round) => round,
            Err(e) => {
                log::warn!("Partie illisible remplacée par une partie vide : {e}");
                Round::new(&[], &[], DateTime::<Utc>::UNIX_EPOCH)
            }
        }
    }
}

/// Format brut accepté au chargement, y compris les anciens exports
/// qui ne stockaient que `hits` et `misses`.
#[derive(Deserialize)]
struct RawRound {
    #[serde(default)]
    drawn: Option<Vec<i64>>,
    #[serde(default)]
    selected: Option<Vec<i64>>,
    #[serde(default)]
    hits: Option<Vec<i64>>,
    #[serde(default)]
    misses: Option<Vec<i64>>,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    payout: Option<Payout>,
}

impl From<RawRound> for Round {
    fn from(raw: RawRound) -> Self {
        let drawn_raw = match raw.drawn {
            Some(drawn) => drawn,
            None => raw
                .hits
                .unwrap_or_default()
                .into_iter()
                .chain(raw.misses.unwrap_or_default())
                .collect(),
        };
        let (drawn, dropped_drawn) = normalize_numbers(drawn_raw);
        let (selected, dropped_selected) = normalize_numbers(raw.selected.unwrap_or_default());
        if dropped_drawn + dropped_selected > 0 {
            log::warn!(
                "{} numéro(s) hors domaine ou en double ignoré(s)",
                dropped_drawn + dropped_selected
            );
        }
        let time = raw
            .time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Round {
            drawn,
            selected,
            time,
            payout: raw.payout,
        }
    }
}

/// Trie, dédoublonne et filtre sur [1, DOMAIN_SIZE]. Retourne aussi le nombre
/// de valeurs écartées.
fn normalize_numbers(values: impl IntoIterator<Item = i64>) -> (Vec<u8>, usize) {
    let mut total = 0usize;
    let mut numbers: Vec<u8> = values
        .into_iter()
        .inspect(|_| total += 1)
        .filter(|&n| n >= 1 && n <= DOMAIN_SIZE as i64)
        .map(|n| n as u8)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    let dropped = total - numbers.len();
    (numbers, dropped)
}

#[derive(Debug, Clone)]
pub struct NumberStats {
    pub number: u8,
    pub frequency: u32,
    pub gap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "HAUSSE"),
            Trend::Down => write!(f, "BAISSE"),
            Trend::Neutral => write!(f, "-"),
        }
    }
}

pub fn validate_round(drawn: &[u8], selected: &[u8]) -> Result<()> {
    if drawn.len() > DOMAIN_SIZE as usize {
        bail!("Trop de numéros tirés : {}", drawn.len());
    }
    for (label, numbers) in [("tiré", drawn), ("sélectionné", selected)] {
        for &n in numbers {
            if n < 1 || n > DOMAIN_SIZE {
                bail!("Numéro {} {} hors limites (1-{})", label, n, DOMAIN_SIZE);
            }
        }
        for i in 0..numbers.len() {
            for j in (i + 1)..numbers.len() {
                if numbers[i] == numbers[j] {
                    bail!("Numéro {} en double : {}", label, numbers[i]);
                }
            }
        }
    }
    Ok(())
}

/// Historique synthétique déterministe, du plus ancien au plus récent.
pub fn make_test_rounds(n: usize) -> Vec<Round> {
    (0..n)
        .map(|i| {
            let drawn: Vec<u8> = (0..DRAW_SIZE)
                .map(|j| ((i * 7 + j * 4) % DOMAIN_SIZE as usize) as u8 + 1)
                .collect();
            let selected: Vec<u8> = (0..5)
                .map(|j| ((i * 3 + j) % DOMAIN_SIZE as usize) as u8 + 1)
                .collect();
            let time = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(i as i64);
            Round::new(&drawn, &selected, time)
        })
        .collect()
}
