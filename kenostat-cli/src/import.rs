use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use kenostat_db::models::Round;

pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub errors: u32,
}

/// Lit un export JSON : soit un tableau de parties, soit un objet
/// `{"history": [...]}`. Les entrées sans numéro tiré sont ignorées.
pub fn read_rounds(path: &Path) -> Result<(Vec<Round>, u32)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("JSON invalide dans {:?}", path))?;
    parse_rounds(value)
}

fn parse_rounds(value: Value) -> Result<(Vec<Round>, u32)> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("history") {
            Some(Value::Array(items)) => items,
            _ => bail!("Champ 'history' absent ou invalide"),
        },
        _ => bail!("Format d'export non reconnu"),
    };

    let mut rounds = Vec::with_capacity(items.len());
    let mut errors = 0u32;
    for (i, item) in items.into_iter().enumerate() {
        let round = Round::from_value_lossy(item);
        if round.drawn().is_empty() {
            log::warn!("Entrée {} sans numéro tiré, ignorée", i);
            errors += 1;
            continue;
        }
        rounds.push(round);
    }
    Ok((rounds, errors))
}

/// "1 5 9" ou "1,5,9" -> [1, 5, 9]
pub fn parse_numbers(input: &str) -> Result<Vec<u8>> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .with_context(|| format!("Nombre invalide : '{}'", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_numbers("1 5 9").unwrap(), vec![1, 5, 9]);
        assert_eq!(parse_numbers(" 3,12 , 40 ").unwrap(), vec![3, 12, 40]);
        assert!(parse_numbers("").unwrap().is_empty());
        assert!(parse_numbers("1 x").is_err());
        assert!(parse_numbers("300").is_err());
    }

    #[test]
    fn test_parse_rounds_array_and_wrapped() {
        let items = json!([
            {"drawn": [1, 2, 3], "selected": [2], "time": 1000},
            {"hits": [4], "misses": [5, 6], "time": 2000},
            {"selected": [1]},
            "garbage"
        ]);
        let (rounds, errors) = parse_rounds(items.clone()).unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(errors, 2);
        assert_eq!(rounds[1].drawn(), &[4, 5, 6]);

        let (wrapped, _) = parse_rounds(json!({"history": items})).unwrap();
        assert_eq!(wrapped, rounds);
    }

    #[test]
    fn test_parse_rounds_rejects_unknown_shape() {
        assert!(parse_rounds(json!(42)).is_err());
        assert!(parse_rounds(json!({"rounds": []})).is_err());
    }

    #[test]
    fn test_read_rounds_from_file() {
        let path = std::env::temp_dir().join(format!("kenostat-import-{}.json", std::process::id()));
        std::fs::write(&path, r#"[{"drawn": [7, 8], "selected": [], "time": 0}]"#).unwrap();
        let (rounds, errors) = read_rounds(&path).unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(errors, 0);
        let _ = std::fs::remove_file(&path);
    }
}
