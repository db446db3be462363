use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::store::KeyValueStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("kenostat.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

/// Stockage clé-valeur sur SQLite. Chaque `set` est une transaction :
/// plusieurs clés sont écrites de façon atomique.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn count_keys(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[String]) -> Result<HashMap<String, Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = stmt
                .query_row([key], |row| row.get(0))
                .optional()
                .with_context(|| format!("Échec de la lecture de '{}'", key))?;
            if let Some(raw) = raw {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("JSON invalide pour '{}'", key))?;
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()
            .context("Impossible de démarrer la transaction")?;
        for (key, value) in &entries {
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, serde_json::to_string(value)?],
            ).context("Échec de l'écriture")?;
        }
        tx.commit().context("Échec du commit")?;
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()
            .context("Impossible de démarrer la transaction")?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", [key])
                .context("Échec de la suppression")?;
        }
        tx.commit().context("Échec du commit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.count_keys().unwrap(), 0);

        store.set(HashMap::from([
            ("history_count".to_string(), json!(2)),
            ("history_chunk_0".to_string(), json!([{"drawn": [1, 2]}])),
        ])).await.unwrap();
        assert_eq!(store.count_keys().unwrap(), 2);

        let got = store.get(&["history_count".into(), "absent".into()]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["history_count"], json!(2));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set(HashMap::from([("k".to_string(), json!(1))])).await.unwrap();
        store.set(HashMap::from([("k".to_string(), json!(2))])).await.unwrap();
        assert_eq!(store.count_keys().unwrap(), 1);
        let got = store.get(&["k".into()]).await.unwrap();
        assert_eq!(got["k"], json!(2));
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set(HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ])).await.unwrap();
        store.remove(&["a".into(), "missing".into()]).await.unwrap();
        assert_eq!(store.count_keys().unwrap(), 1);
    }
}
