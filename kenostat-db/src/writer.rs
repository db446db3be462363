//! Écriture différée de l'historique.
//!
//! Une seule tâche possède les accès au stockage. Chaque ajout arme (ou
//! réarme) une échéance ; à l'échéance, toutes les parties en attente sont
//! écrites en un seul `set` couvrant les chunks touchés et le compteur.
//! Tant qu'une migration de l'ancien format n'a pas abouti, les ajouts sont
//! rattachés aux parties à migrer et réécrits avec elles.
//!
//! ```text
//! Idle ──append──▶ Pending(deadline) ──échéance──▶ Flushing ──▶ Idle
//!                    │   ▲
//!                    └───┘ append : nouvelle échéance
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::history::{chunk_key, COUNT_KEY, LEGACY_KEY};
use crate::models::Round;
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterPhase {
    Idle,
    Pending { deadline: Instant },
    Flushing,
}

pub(crate) enum WriterCommand {
    Append { index: usize, round: Round },
    Flush { ack: oneshot::Sender<()> },
    Clear { known_len: usize, ack: oneshot::Sender<Result<()>> },
    Migrate { rounds: Vec<Round> },
    DropLegacy,
}

pub(crate) struct WriterHandle {
    tx: mpsc::UnboundedSender<WriterCommand>,
    phase: watch::Receiver<WriterPhase>,
}

impl WriterHandle {
    pub(crate) fn spawn(
        store: Arc<dyn KeyValueStore>,
        chunk_size: usize,
        debounce: Duration,
        persisted_len: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(WriterPhase::Idle);
        let writer = ChunkWriter {
            store,
            chunk_size,
            debounce,
            pending: Vec::new(),
            known_len: persisted_len,
            unmigrated: None,
            phase: WriterPhase::Idle,
            phase_tx,
        };
        tokio::spawn(writer.run(rx));
        Self { tx, phase: phase_rx }
    }

    /// Poignée sans tâche derrière : tout envoi échoue.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (tx, _) = mpsc::unbounded_channel();
        let (_, phase) = watch::channel(WriterPhase::Idle);
        Self { tx, phase }
    }

    pub(crate) fn send(&self, command: WriterCommand) -> bool {
        if self.tx.send(command).is_err() {
            log::warn!("Tâche d'écriture arrêtée : commande ignorée");
            return false;
        }
        true
    }

    pub(crate) fn phase(&self) -> WriterPhase {
        *self.phase.borrow()
    }
}

struct ChunkWriter {
    store: Arc<dyn KeyValueStore>,
    chunk_size: usize,
    debounce: Duration,
    pending: Vec<(usize, Round)>,
    /// Plus grande longueur d'historique dont on a tenté l'écriture.
    known_len: usize,
    /// Historique complet en attente de migration.
    unmigrated: Option<Vec<Round>>,
    phase: WriterPhase,
    phase_tx: watch::Sender<WriterPhase>,
}

impl ChunkWriter {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
        loop {
            let command = match self.phase {
                WriterPhase::Pending { deadline } => {
                    tokio::select! {
                        command = rx.recv() => command,
                        _ = time::sleep_until(deadline) => {
                            self.flush_pending().await;
                            continue;
                        }
                    }
                }
                _ => rx.recv().await,
            };

            let Some(command) = command else {
                // Canal fermé : on vide ce qui reste avant de s'arrêter
                self.flush_pending().await;
                break;
            };
            self.handle(command).await;
        }
        log::debug!("Tâche d'écriture terminée");
    }

    async fn handle(&mut self, command: WriterCommand) {
        match command {
            WriterCommand::Append { index, round } => {
                self.pending.push((index, round));
                let deadline = Instant::now() + self.debounce;
                self.set_phase(WriterPhase::Pending { deadline });
            }
            WriterCommand::Flush { ack } => {
                self.flush_pending().await;
                let _ = ack.send(());
            }
            WriterCommand::Clear { known_len, ack } => {
                self.pending.clear();
                self.unmigrated = None;
                self.set_phase(WriterPhase::Idle);
                let result = self.remove_all(known_len).await;
                if result.is_ok() {
                    self.known_len = 0;
                }
                let _ = ack.send(result);
            }
            WriterCommand::Migrate { rounds } => {
                self.unmigrated = Some(rounds);
                self.retry_migration().await;
            }
            WriterCommand::DropLegacy => {
                if let Err(e) = self.store.remove(&[LEGACY_KEY.to_string()]).await {
                    log::warn!("Suppression de l'ancienne clé impossible : {e:#}");
                }
            }
        }
    }

    fn set_phase(&mut self, phase: WriterPhase) {
        log::trace!("Écriture : {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        let _ = self.phase_tx.send(phase);
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() && self.unmigrated.is_none() {
            self.set_phase(WriterPhase::Idle);
            return;
        }
        self.set_phase(WriterPhase::Flushing);
        let batch = std::mem::take(&mut self.pending);
        if let Some(unmigrated) = self.unmigrated.as_mut() {
            // Un chunk 0 partiel écraserait la migration en attente
            for (index, round) in batch {
                if index != unmigrated.len() {
                    log::warn!("Partie {index} hors séquence ({} attendue)", unmigrated.len());
                }
                unmigrated.push(round);
            }
            self.retry_migration().await;
            self.set_phase(WriterPhase::Idle);
            return;
        }
        if let Err(e) = self.write_batch(&batch).await {
            // Pas de nouvelle tentative : la mémoire reste la référence
            log::warn!("Écriture de {} partie(s) abandonnée : {e:#}", batch.len());
        }
        self.set_phase(WriterPhase::Idle);
    }

    async fn write_batch(&mut self, batch: &[(usize, Round)]) -> Result<()> {
        let mut by_chunk: BTreeMap<usize, Vec<&(usize, Round)>> = BTreeMap::new();
        for entry in batch {
            by_chunk.entry(entry.0 / self.chunk_size).or_default().push(entry);
        }

        let keys: Vec<String> = by_chunk.keys().map(|&i| chunk_key(i)).collect();
        let mut existing = self.store.get(&keys).await
            .context("Lecture des chunks impossible")?;

        let mut entries = HashMap::with_capacity(by_chunk.len() + 1);
        let mut count = 0usize;
        for (chunk_index, rounds) in by_chunk {
            let key = chunk_key(chunk_index);
            let mut chunk = match existing.remove(&key) {
                Some(Value::Array(items)) => items,
                Some(_) => {
                    log::warn!("Chunk {chunk_index} illisible, réécrit");
                    Vec::new()
                }
                None => Vec::new(),
            };
            for (index, round) in rounds {
                let offset = index % self.chunk_size;
                if chunk.len() > offset {
                    chunk.truncate(offset);
                } else if chunk.len() < offset {
                    log::warn!(
                        "Chunk {chunk_index} incomplet : {} partie(s) au lieu de {offset}",
                        chunk.len()
                    );
                }
                chunk.push(serde_json::to_value(round)?);
                count = count.max(index + 1);
            }
            entries.insert(key, Value::Array(chunk));
        }
        entries.insert(COUNT_KEY.to_string(), Value::from(count));

        self.store.set(entries).await
            .context("Écriture des chunks impossible")?;
        self.known_len = self.known_len.max(count);
        log::debug!("{} partie(s) écrite(s), history_count={count}", batch.len());
        Ok(())
    }

    /// Tente la migration en attente ; en cas d'échec elle reste en attente
    /// et l'ancienne clé est conservée.
    async fn retry_migration(&mut self) {
        let Some(rounds) = self.unmigrated.take() else {
            return;
        };
        if let Err(e) = self.migrate(&rounds).await {
            log::warn!("Migration de l'ancien format interrompue : {e:#}");
            self.unmigrated = Some(rounds);
        }
    }

    /// Ancien format vers chunks : un seul `set` pour les chunks et le
    /// compteur, puis suppression de l'ancienne clé. Les deux étapes ne sont
    /// pas atomiques entre elles ; le chargeur privilégie les chunks complets.
    async fn migrate(&mut self, rounds: &[Round]) -> Result<()> {
        let mut entries = HashMap::new();
        for (i, chunk) in rounds.chunks(self.chunk_size).enumerate() {
            entries.insert(chunk_key(i), serde_json::to_value(chunk)?);
        }
        entries.insert(COUNT_KEY.to_string(), Value::from(rounds.len()));
        self.store.set(entries).await
            .context("Écriture des chunks migrés impossible")?;
        self.known_len = self.known_len.max(rounds.len());
        log::info!("{} partie(s) migrée(s) vers le format par chunks", rounds.len());

        if let Err(e) = self.store.remove(&[LEGACY_KEY.to_string()]).await {
            // Les chunks sont complets : le prochain chargement finira le ménage
            log::warn!("Suppression de l'ancienne clé impossible : {e:#}");
        }
        Ok(())
    }

    async fn remove_all(&mut self, known_len: usize) -> Result<()> {
        let stored = self.store.get(&[COUNT_KEY.to_string()]).await
            .context("Lecture du compteur impossible")?;
        let stored_len = stored
            .get(COUNT_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;

        let len = known_len.max(self.known_len).max(stored_len);
        let mut keys = vec![COUNT_KEY.to_string(), LEGACY_KEY.to_string()];
        keys.extend((0..len.div_ceil(self.chunk_size)).map(chunk_key));
        self.store.remove(&keys).await
            .context("Suppression de l'historique impossible")?;
        log::info!("Historique effacé ({} clé(s))", keys.len());
        Ok(())
    }
}
