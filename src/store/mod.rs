pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cnidarium::{StateDelta, StateWrite, Storage};
use futures::StreamExt;
use tracing::{debug, warn};

use types::AnswerRecord;

/// Logical tables of the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Processed-document cache, keyed by PMID.
    Articles,
    /// Final-answer cache, keyed by question hash.
    Answers,
}

impl Table {
    // Key prefixes (no trailing slashes, cnidarium convention)
    pub fn prefix(self) -> &'static str {
        match self {
            Table::Articles => "article",
            Table::Answers => "answer",
        }
    }

    fn key(self, id: &str) -> String {
        format!("{}/{}", self.prefix(), id)
    }
}

/// Keyed JSON record store. `upsert` replaces whatever was stored under the
/// key, so a key never holds more than one record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>>;

    async fn upsert_many(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<()>;

    /// All `(key, value)` pairs in a table, keys without the table prefix.
    async fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>>;

    async fn upsert(&self, table: Table, key: &str, value: Vec<u8>) -> Result<()> {
        self.upsert_many(table, vec![(key.to_string(), value)]).await
    }
}

pub struct CnidariumStore {
    storage: Storage,
    // Held from snapshot to commit; cnidarium rejects a delta forked from a
    // stale version.
    commit_lock: tokio::sync::Mutex<()>,
}

impl CnidariumStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![
            Table::Articles.prefix().to_string(),
            Table::Answers.prefix().to_string(),
        ];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            commit_lock: tokio::sync::Mutex::new(()),
        })
    }
}

#[async_trait]
impl RecordStore for CnidariumStore {
    async fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        snapshot.get_raw(&table.key(key)).await
    }

    async fn upsert_many(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let count = entries.len();
        let _guard = self.commit_lock.lock().await;
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        for (key, value) in entries {
            delta.put_raw(table.key(&key), value);
        }
        self.storage.commit(delta).await?;
        debug!(table = table.prefix(), count, "records upserted");
        Ok(())
    }

    async fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>> {
        let snapshot = self.storage.latest_snapshot();
        use cnidarium::StateRead;
        let prefix = format!("{}/", table.prefix());
        let mut stream = snapshot.prefix_raw(&prefix);
        let mut results = Vec::new();

        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => {
                    if let Some(id) = key.strip_prefix(&prefix) {
                        results.push((id.to_string(), value));
                    }
                }
                Err(e) => {
                    warn!(table = table.prefix(), "Error reading record stream: {}", e);
                }
            }
        }

        Ok(results)
    }
}

/// Final answers, looked up by exact question text.
pub struct AnswerArchive {
    store: Arc<dyn RecordStore>,
}

impl AnswerArchive {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Content-addressed key for a question (blake3 of the trimmed text).
    pub fn question_key(question: &str) -> String {
        blake3::hash(question.trim().as_bytes()).to_hex().to_string()
    }

    pub async fn put(&self, record: &AnswerRecord) -> Result<()> {
        let value = serde_json::to_vec(record).context("serialize AnswerRecord")?;
        self.store
            .upsert(Table::Answers, &Self::question_key(&record.question), value)
            .await?;
        debug!(session_id = %record.session_id, "answer stored");
        Ok(())
    }

    pub async fn get(&self, question: &str) -> Result<Option<AnswerRecord>> {
        let Some(bytes) = self
            .store
            .get(Table::Answers, &Self::question_key(question))
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Every stored question, newest first.
    pub async fn questions(&self) -> Result<Vec<String>> {
        let mut records: Vec<AnswerRecord> = self
            .store
            .scan(Table::Answers)
            .await?
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records.into_iter().map(|r| r.question).collect())
    }
}

/// In-memory store used by tests.
#[cfg(test)]
pub mod memory {
    use std::collections::BTreeMap;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStore {
        rows: tokio::sync::RwLock<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        pub async fn len(&self, table: Table) -> usize {
            let prefix = format!("{}/", table.prefix());
            self.rows
                .read()
                .await
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .count()
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.rows.read().await.get(&table.key(key)).cloned())
        }

        async fn upsert_many(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
            let mut rows = self.rows.write().await;
            for (key, value) in entries {
                rows.insert(table.key(&key), value);
            }
            Ok(())
        }

        async fn scan(&self, table: Table) -> Result<Vec<(String, Vec<u8>)>> {
            let prefix = format!("{}/", table.prefix());
            Ok(self
                .rows
                .read()
                .await
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|id| (id.to_string(), v.clone())))
                .collect())
        }
    }
}
