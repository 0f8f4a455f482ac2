use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::StoredInteraction;

/// Result of a best-effort insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(String),
    NotSaved(String),
}

/// Append-only sink for generated interactions.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn insert(&self, record: &StoredInteraction) -> SaveOutcome;
}

struct Collection {
    conn: Connection,
    table: String,
}

/// SQLite backed document store. One database file per database name,
/// one table per collection holding JSON documents keyed by `_id`.
pub struct InteractionStore {
    collection: Mutex<Option<Collection>>,
    connected: AtomicBool,
}

impl InteractionStore {
    /// A store that never connected. Inserts are skipped.
    pub fn disconnected() -> Self {
        Self {
            collection: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Open the configured database and collection.
    /// Failures are logged and leave the store disconnected.
    pub async fn connect(config: &StoreConfig) -> Self {
        info!("Attempting to connect to the interaction store...");
        match Self::open(config) {
            Ok(collection) => {
                info!(
                    "Connected to database '{}' and collection '{}'",
                    config.database, config.collection
                );
                Self {
                    collection: Mutex::new(Some(collection)),
                    connected: AtomicBool::new(true),
                }
            }
            Err(e) => {
                error!("Could not connect to the interaction store: {:#}", e);
                Self::disconnected()
            }
        }
    }

    fn open(config: &StoreConfig) -> Result<Collection> {
        let uri = config
            .uri
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .context("Store URI is not set")?;

        let table = config.collection.trim();
        if !is_valid_name(table) {
            anyhow::bail!("Invalid collection name: {:?}", config.collection);
        }
        let database = config.database.trim();
        if !is_valid_name(database) {
            anyhow::bail!("Invalid database name: {:?}", config.database);
        }

        let conn = if uri == ":memory:" {
            Connection::open_in_memory().context("Failed to open in-memory database")?
        } else {
            let dir = Path::new(uri);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
            let path = dir.join(format!("{database}.sqlite3"));
            Connection::open(&path)
                .with_context(|| format!("Failed to open database: {}", path.display()))?
        };

        let _: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .context("Store ping failed")?;

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                _id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
            );"
        ))
        .with_context(|| format!("Failed to create collection: {table}"))?;

        Ok(Collection {
            conn,
            table: table.to_string(),
        })
    }

    /// Release the connection. Safe to call more than once.
    pub async fn disconnect(&self) {
        let mut guard = self.collection.lock().await;
        self.connected.store(false, Ordering::SeqCst);
        if let Some(collection) = guard.take() {
            match collection.conn.close() {
                Ok(()) => info!("Interaction store connection closed."),
                Err((_, e)) => warn!("Error while closing interaction store: {}", e),
            }
        }
    }

    async fn try_insert(&self, record: &StoredInteraction) -> Result<String> {
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut document =
            serde_json::to_value(record).context("Failed to serialize interaction")?;
        if let Some(map) = document.as_object_mut() {
            map.remove("_id");
        }
        let document = serde_json::to_string(&document)?;

        // Single-row insert on the executor thread, serialized by the mutex.
        // The lock is never held across an await.
        let guard = self.collection.lock().await;
        let collection = guard.as_ref().context("Store is not connected")?;
        collection
            .conn
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (_id, document) VALUES (?1, ?2)",
                    collection.table
                ),
                rusqlite::params![&id, &document],
            )
            .context("Failed to insert interaction")?;

        Ok(id)
    }
}

#[async_trait]
impl InteractionSink for InteractionStore {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn insert(&self, record: &StoredInteraction) -> SaveOutcome {
        if !self.is_connected() {
            warn!("Cannot save interaction: store is not connected");
            return SaveOutcome::NotSaved("store is not connected".to_string());
        }
        match self.try_insert(record).await {
            Ok(id) => {
                info!("Inserted interaction with ID: {}", id);
                SaveOutcome::Saved(id)
            }
            Err(e) => {
                error!("Failed to save interaction: {:#}", e);
                SaveOutcome::NotSaved(format!("{:#}", e))
            }
        }
    }
}

/// Identifier safe to splice into SQL as a quoted name.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
impl InteractionStore {
    async fn count(&self) -> usize {
        let guard = self.collection.lock().await;
        let Some(collection) = guard.as_ref() else {
            return 0;
        };
        let n: i64 = collection
            .conn
            .query_row(
                &format!("SELECT count(*) FROM \"{}\"", collection.table),
                [],
                |row| row.get(0),
            )
            .unwrap();
        n as usize
    }

    async fn find(&self, id: &str) -> Option<StoredInteraction> {
        let guard = self.collection.lock().await;
        let collection = guard.as_ref()?;
        let document: String = collection
            .conn
            .query_row(
                &format!("SELECT document FROM \"{}\" WHERE _id = ?1", collection.table),
                rusqlite::params![id],
                |row| row.get(0),
            )
            .ok()?;
        let mut record: StoredInteraction = serde_json::from_str(&document).ok()?;
        record.id = Some(id.to_string());
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReplyResult;

    fn memory_config() -> StoreConfig {
        StoreConfig {
            uri: Some(":memory:".to_string()),
            ..StoreConfig::default()
        }
    }

    fn record(reply: &str) -> StoredInteraction {
        StoredInteraction::new(ReplyResult {
            platform: "LinkedIn".to_string(),
            post_text: "Excited to share my talk slides".to_string(),
            generated_reply: reply.to_string(),
        })
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = InteractionStore::connect(&memory_config()).await;
        assert!(store.is_connected());

        let original = record("Congrats on the talk!");
        let SaveOutcome::Saved(id) = store.insert(&original).await else {
            panic!("insert should succeed");
        };

        let found = store.find(&id).await.unwrap();
        assert_eq!(found.id.as_deref(), Some(id.as_str()));
        assert_eq!(found.reply, original.reply);
        assert_eq!(found.timestamp, original.timestamp);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_document_does_not_embed_id() {
        let store = InteractionStore::connect(&memory_config()).await;
        let SaveOutcome::Saved(id) = store.insert(&record("Nice")).await else {
            panic!("insert should succeed");
        };

        let guard = store.collection.lock().await;
        let collection = guard.as_ref().unwrap();
        let document: String = collection
            .conn
            .query_row(
                "SELECT document FROM replies WHERE _id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&document).unwrap();
        assert!(value.get("_id").is_none());
        assert_eq!(value["generated_reply"], "Nice");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_each_insert_gets_a_fresh_id() {
        let store = InteractionStore::connect(&memory_config()).await;
        let a = store.insert(&record("one")).await;
        let b = store.insert(&record("two")).await;
        assert_ne!(a, b);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_are_all_saved() {
        let store = std::sync::Arc::new(InteractionStore::connect(&memory_config()).await);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.insert(&record(&format!("reply {i}"))).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let SaveOutcome::Saved(id) = handle.await.unwrap() else {
                panic!("concurrent insert should succeed");
            };
            ids.insert(id);
        }
        assert_eq!(ids.len(), 16);
        assert_eq!(store.count().await, 16);
    }

    #[tokio::test]
    async fn test_missing_uri_leaves_store_disconnected() {
        let store = InteractionStore::connect(&StoreConfig::default()).await;
        assert!(!store.is_connected());
        assert!(matches!(
            store.insert(&record("hi")).await,
            SaveOutcome::NotSaved(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_collection_name_leaves_store_disconnected() {
        let config = StoreConfig {
            collection: "replies\"; DROP TABLE x; --".to_string(),
            ..memory_config()
        };
        let store = InteractionStore::connect(&config).await;
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let store = InteractionStore::connect(&memory_config()).await;
        store.disconnect().await;
        store.disconnect().await;
        assert!(!store.is_connected());
        assert!(matches!(
            store.insert(&record("late")).await,
            SaveOutcome::NotSaved(_)
        ));

        let never = InteractionStore::disconnected();
        never.disconnect().await;
        assert!(!never.is_connected());
    }

    #[tokio::test]
    async fn test_insert_failure_is_reported_not_raised() {
        let store = InteractionStore::connect(&memory_config()).await;
        {
            let guard = store.collection.lock().await;
            guard
                .as_ref()
                .unwrap()
                .conn
                .execute_batch("DROP TABLE replies;")
                .unwrap();
        }
        assert!(store.is_connected());
        assert!(matches!(
            store.insert(&record("lost")).await,
            SaveOutcome::NotSaved(_)
        ));
    }

    #[tokio::test]
    async fn test_on_disk_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            uri: Some(dir.path().to_string_lossy().to_string()),
            database: "Replies".to_string(),
            collection: "twitter_replies".to_string(),
        };

        let store = InteractionStore::connect(&config).await;
        let SaveOutcome::Saved(id) = store.insert(&record("Saved to disk")).await else {
            panic!("insert should succeed");
        };
        store.disconnect().await;
        assert!(dir.path().join("Replies.sqlite3").exists());

        let reopened = InteractionStore::connect(&config).await;
        let found = reopened.find(&id).await.unwrap();
        assert_eq!(found.reply.generated_reply, "Saved to disk");
    }
}
