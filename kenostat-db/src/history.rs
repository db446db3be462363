use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::models::Round;
use crate::store::KeyValueStore;
use crate::writer::{WriterCommand, WriterHandle, WriterPhase};

pub const COUNT_KEY: &str = "history_count";
/// Ancien format : tout l'historique sous une seule clé.
pub const LEGACY_KEY: &str = "history";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

pub fn chunk_key(index: usize) -> String {
    format!("history_chunk_{index}")
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryOptions {
    pub chunk_size: usize,
    pub debounce: Duration,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Historique ordonné des parties, en ajout seul.
///
/// La séquence en mémoire fait autorité ; les chunks persistés en sont un
/// miroir au mieux. Le chunk `i` contient les parties `[i*C, (i+1)*C)`.
pub struct HistoryStore {
    rounds: Vec<Round>,
    options: HistoryOptions,
    writer: WriterHandle,
}

enum Followup {
    Migrate,
    DropLegacy,
}

impl HistoryStore {
    /// Charge l'historique. Le format par chunks l'emporte dès que
    /// `history_count > 0`, sauf s'il est incomplet et que l'ancien format
    /// contient davantage de parties. L'ancien format est migré en tâche de
    /// fond ; l'ancienne clé n'est supprimée que derrière des chunks complets.
    pub async fn load(store: Arc<dyn KeyValueStore>, options: HistoryOptions) -> Result<Self> {
        let options = HistoryOptions {
            chunk_size: options.chunk_size.max(1),
            ..options
        };
        let (rounds, followup) = read_history(store.as_ref(), options.chunk_size).await?;
        let writer = WriterHandle::spawn(store, options.chunk_size, options.debounce, rounds.len());

        schedule(&writer, followup, &rounds)?;

        Ok(Self { rounds, options, writer })
    }

    /// Ajoute une partie et programme son écriture. Ne bloque jamais.
    pub fn append(&mut self, round: Round) -> usize {
        let index = self.rounds.len();
        self.rounds.push(round.clone());
        self.writer.send(WriterCommand::Append { index, round });
        index
    }

    /// Force l'écriture en attente et attend sa fin.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if !self.writer.send(WriterCommand::Flush { ack }) {
            return Err(anyhow!("Tâche d'écriture arrêtée"));
        }
        done.await.context("Tâche d'écriture arrêtée pendant le flush")
    }

    /// Efface toutes les clés persistées et vide la mémoire.
    pub async fn clear(&mut self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        let known_len = self.rounds.len();
        self.rounds.clear();
        if !self.writer.send(WriterCommand::Clear { known_len, ack }) {
            return Err(anyhow!("Tâche d'écriture arrêtée"));
        }
        done.await.context("Tâche d'écriture arrêtée pendant l'effacement")?
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Les `size` parties les plus récentes, en ordre chronologique.
    pub fn sample(&self, size: usize) -> &[Round] {
        let start = self.rounds.len().saturating_sub(size);
        &self.rounds[start..]
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    pub fn writer_phase(&self) -> WriterPhase {
        self.writer.phase()
    }
}

fn schedule(writer: &WriterHandle, followup: Option<Followup>, rounds: &[Round]) -> Result<()> {
    let sent = match followup {
        Some(Followup::Migrate) => writer.send(WriterCommand::Migrate { rounds: rounds.to_vec() }),
        Some(Followup::DropLegacy) => writer.send(WriterCommand::DropLegacy),
        None => true,
    };
    if !sent {
        return Err(anyhow!("Tâche d'écriture arrêtée au chargement"));
    }
    Ok(())
}

async fn read_history(
    store: &dyn KeyValueStore,
    chunk_size: usize,
) -> Result<(Vec<Round>, Option<Followup>)> {
    let mut meta = store
        .get(&[COUNT_KEY.to_string(), LEGACY_KEY.to_string()])
        .await
        .context("Lecture de l'historique impossible")?;
    let count = meta
        .get(COUNT_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let legacy = meta.remove(LEGACY_KEY);

    if count > 0 {
        let keys: Vec<String> = (0..count.div_ceil(chunk_size)).map(chunk_key).collect();
        let chunks = store.get(&keys).await
            .context("Lecture des chunks impossible")?;
        let rounds = concat_chunks(&keys, chunks, count);
        log::info!("{} partie(s) chargée(s) depuis {} chunk(s)", rounds.len(), keys.len());
        if rounds.len() == count {
            // Migration interrompue : l'ancienne clé traîne encore
            let followup = legacy.map(|_| Followup::DropLegacy);
            return Ok((rounds, followup));
        }

        log::warn!(
            "history_count={count} mais {} partie(s) dans les chunks",
            rounds.len()
        );
        if let Some(Value::Array(items)) = legacy {
            let legacy_rounds = decode_rounds(items);
            if legacy_rounds.len() > rounds.len() {
                log::warn!(
                    "Reprise depuis l'ancien format ({} partie(s))",
                    legacy_rounds.len()
                );
                return Ok((legacy_rounds, Some(Followup::Migrate)));
            }
        }
        return Ok((rounds, None));
    }

    match legacy {
        Some(Value::Array(items)) if !items.is_empty() => {
            let rounds = decode_rounds(items);
            log::info!("{} partie(s) chargée(s) depuis l'ancien format", rounds.len());
            Ok((rounds, Some(Followup::Migrate)))
        }
        Some(_) => Ok((Vec::new(), Some(Followup::DropLegacy))),
        None => Ok((Vec::new(), None)),
    }
}

fn decode_rounds(items: Vec<Value>) -> Vec<Round> {
    items.into_iter().map(Round::from_value_lossy).collect()
}

fn concat_chunks(keys: &[String], mut chunks: HashMap<String, Value>, count: usize) -> Vec<Round> {
    let mut rounds = Vec::with_capacity(count);
    for key in keys {
        match chunks.remove(key) {
            Some(Value::Array(items)) => {
                rounds.extend(decode_rounds(items));
            }
            Some(_) => log::warn!("{key} n'est pas une liste, ignoré"),
            None => log::warn!("{key} manquant"),
        }
    }
    rounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_rounds;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn options(chunk_size: usize) -> HistoryOptions {
        HistoryOptions {
            chunk_size,
            debounce: Duration::from_millis(100),
        }
    }

    fn chunk_len(store: &MemoryStore, index: usize) -> usize {
        store
            .value(&chunk_key(index))
            .and_then(|v| v.as_array().map(|a| a.len()))
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty() {
        let store = Arc::new(MemoryStore::new());
        let history = HistoryStore::load(store, options(1000)).await.unwrap();
        assert!(history.is_empty());
        assert_eq!(history.writer_phase(), WriterPhase::Idle);
    }

    #[tokio::test]
    async fn test_1001_appends_fill_two_chunks() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        for round in make_test_rounds(1001) {
            history.append(round);
        }
        history.flush().await.unwrap();

        assert_eq!(history.len(), 1001);
        assert_eq!(chunk_len(&store, 0), 1000);
        assert_eq!(chunk_len(&store, 1), 1);
        assert_eq!(store.value(COUNT_KEY), Some(json!(1001)));
    }

    #[tokio::test]
    async fn test_chunk_invariant_across_flushes() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(4)).await.unwrap();
        let rounds = make_test_rounds(11);
        for (i, round) in rounds.into_iter().enumerate() {
            history.append(round);
            if i % 3 == 0 {
                history.flush().await.unwrap();
            }
        }
        history.flush().await.unwrap();

        let total: usize = (0..3).map(|i| chunk_len(&store, i)).sum();
        assert_eq!(total, 11);
        assert_eq!(chunk_len(&store, 0), 4);
        assert_eq!(chunk_len(&store, 2), 3);
        assert_eq!(store.value(COUNT_KEY), Some(json!(11)));
    }

    #[tokio::test]
    async fn test_reload_restores_order() {
        let store = Arc::new(MemoryStore::new());
        let rounds = make_test_rounds(25);
        {
            let mut history = HistoryStore::load(store.clone(), options(10)).await.unwrap();
            for round in rounds.clone() {
                history.append(round);
            }
            history.flush().await.unwrap();
        }
        let reloaded = HistoryStore::load(store, options(10)).await.unwrap();
        assert_eq!(reloaded.rounds(), rounds.as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces_burst() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        let mut rounds = make_test_rounds(6).into_iter();

        for round in rounds.by_ref().take(5) {
            history.append(round);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.set_calls(), 0);
        assert!(matches!(history.writer_phase(), WriterPhase::Pending { .. }));

        // Nouvel ajout avant l'échéance : le délai repart
        history.append(rounds.next().unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.set_calls(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.set_calls(), 1);
        assert_eq!(history.writer_phase(), WriterPhase::Idle);
        assert_eq!(chunk_len(&store, 0), 6);
        assert_eq!(store.value(COUNT_KEY), Some(json!(6)));
    }

    #[tokio::test]
    async fn test_legacy_format_is_migrated() {
        let legacy: Vec<Value> = make_test_rounds(3)
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([(
            LEGACY_KEY.to_string(),
            Value::Array(legacy),
        )])));

        let history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        assert_eq!(history.len(), 3);
        history.flush().await.unwrap();

        assert_eq!(chunk_len(&store, 0), 3);
        assert_eq!(store.value(COUNT_KEY), Some(json!(3)));
        assert!(store.value(LEGACY_KEY).is_none());
    }

    #[tokio::test]
    async fn test_chunked_wins_over_leftover_legacy() {
        let chunk: Vec<Value> = make_test_rounds(2)
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        let legacy: Vec<Value> = make_test_rounds(5)
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([
            (COUNT_KEY.to_string(), json!(2)),
            (chunk_key(0), Value::Array(chunk)),
            (LEGACY_KEY.to_string(), Value::Array(legacy)),
        ])));

        let history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        assert_eq!(history.len(), 2);
        history.flush().await.unwrap();
        assert!(store.value(LEGACY_KEY).is_none());

        // Recharger donne le même résultat
        let again = HistoryStore::load(store, options(1000)).await.unwrap();
        assert_eq!(again.rounds(), history.rounds());
    }

    fn as_values(rounds: &[Round]) -> Vec<Value> {
        rounds.iter().map(|r| serde_json::to_value(r).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_failed_migration_is_retried_with_new_rounds() {
        let rounds = make_test_rounds(6);
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([(
            LEGACY_KEY.to_string(),
            Value::Array(as_values(&rounds[..5])),
        )])));

        store.set_fail_writes(true);
        let mut history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        history.flush().await.unwrap();
        assert!(store.value(COUNT_KEY).is_none());
        assert!(store.value(LEGACY_KEY).is_some());

        store.set_fail_writes(false);
        history.append(rounds[5].clone());
        history.flush().await.unwrap();
        assert_eq!(chunk_len(&store, 0), 6);
        assert_eq!(store.value(COUNT_KEY), Some(json!(6)));
        assert!(store.value(LEGACY_KEY).is_none());

        let reloaded = HistoryStore::load(store, options(1000)).await.unwrap();
        assert_eq!(reloaded.rounds(), rounds.as_slice());
    }

    #[tokio::test]
    async fn test_short_chunks_fall_back_to_legacy() {
        let rounds = make_test_rounds(6);
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([
            (COUNT_KEY.to_string(), json!(6)),
            (chunk_key(0), Value::Array(as_values(&rounds[5..]))),
            (LEGACY_KEY.to_string(), Value::Array(as_values(&rounds[..5]))),
        ])));

        let history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        assert_eq!(history.rounds(), &rounds[..5]);
        history.flush().await.unwrap();
        assert_eq!(chunk_len(&store, 0), 5);
        assert_eq!(store.value(COUNT_KEY), Some(json!(5)));
        assert!(store.value(LEGACY_KEY).is_none());
    }

    #[tokio::test]
    async fn test_short_chunks_keep_legacy_key() {
        let rounds = make_test_rounds(4);
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([
            (COUNT_KEY.to_string(), json!(8)),
            (chunk_key(0), Value::Array(as_values(&rounds[..3]))),
            (LEGACY_KEY.to_string(), Value::Array(as_values(&rounds[..2]))),
        ])));

        let history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        assert_eq!(history.len(), 3);
        history.flush().await.unwrap();
        assert!(store.value(LEGACY_KEY).is_some());
    }

    #[test]
    fn test_followup_on_stopped_writer_fails() {
        let writer = WriterHandle::detached();
        let rounds = make_test_rounds(2);
        assert!(schedule(&writer, None, &rounds).is_ok());
        assert!(schedule(&writer, Some(Followup::DropLegacy), &rounds).is_err());
        assert!(schedule(&writer, Some(Followup::Migrate), &rounds).is_err());
    }

    #[tokio::test]
    async fn test_malformed_rounds_load_as_empty() {
        let store = Arc::new(MemoryStore::with_entries(HashMap::from([
            (COUNT_KEY.to_string(), json!(3)),
            (chunk_key(0), json!([
                {"time": 5},
                {"hits": [1, 2], "misses": [3], "time": 6},
                42
            ])),
        ])));
        let history = HistoryStore::load(store, options(1000)).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.rounds()[0].drawn().is_empty());
        assert_eq!(history.rounds()[1].drawn(), &[1, 2, 3]);
        assert!(history.rounds()[2].drawn().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(1000)).await.unwrap();
        let mut rounds = make_test_rounds(2).into_iter();

        store.set_fail_writes(true);
        history.append(rounds.next().unwrap());
        history.flush().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(store.value(COUNT_KEY).is_none());

        // Pas de nouvelle tentative : seule la partie suivante est écrite
        store.set_fail_writes(false);
        history.append(rounds.next().unwrap());
        history.flush().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.set_calls(), 1);
        assert_eq!(store.value(COUNT_KEY), Some(json!(2)));
        assert_eq!(chunk_len(&store, 0), 1);
    }

    #[tokio::test]
    async fn test_clear_wipes_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(10)).await.unwrap();
        for round in make_test_rounds(25) {
            history.append(round);
        }
        history.flush().await.unwrap();
        assert!(!store.snapshot().is_empty());

        history.clear().await.unwrap();
        assert!(history.is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_write() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store.clone(), options(10)).await.unwrap();
        history.append(make_test_rounds(1).remove(0));
        history.clear().await.unwrap();
        history.flush().await.unwrap();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.set_calls(), 0);
    }

    #[tokio::test]
    async fn test_sample_returns_most_recent() {
        let store = Arc::new(MemoryStore::new());
        let mut history = HistoryStore::load(store, options(10)).await.unwrap();
        let rounds = make_test_rounds(8);
        for round in rounds.clone() {
            history.append(round);
        }
        assert_eq!(history.sample(3), &rounds[5..]);
        assert_eq!(history.sample(100).len(), 8);
    }
}
