//! Stockage clé-valeur persistant, vu comme un collaborateur asynchrone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Les clés absentes ne figurent pas dans le résultat.
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>>;
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;
    async fn remove(&self, keys: &[String]) -> Result<()>;
}

/// Implémentation en mémoire, avec injection de pannes pour les tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
    set_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Nombre d'appels `set` réussis.
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.lock().clone()
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, new_entries: HashMap<String, Value>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("écriture refusée par le stockage");
        }
        self.entries.lock().extend(new_entries);
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("suppression refusée par le stockage");
        }
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
