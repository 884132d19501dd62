use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::article::Document;
use crate::store::types::ReliabilityRecord;
use crate::store::{RecordStore, Table};

/// Previously processed documents, one record per PMID.
pub struct ReliabilityCache {
    store: Arc<dyn RecordStore>,
}

/// Relevant documents split by cache membership.
#[derive(Debug, Default)]
pub struct CacheSplit {
    /// Documents rebuilt from their stored record.
    pub matched: Vec<Document>,
    pub to_process: Vec<Document>,
}

impl ReliabilityCache {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, pmid: &str) -> Result<Option<ReliabilityRecord>> {
        let Some(bytes) = self.store.get(Table::Articles, pmid).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)
            .with_context(|| format!("decode cached record {}", pmid))?;
        Ok(Some(record))
    }

    /// Partition `relevant` into cache hits and misses. A hit replaces the
    /// fresh document entirely. A record that fails to decode counts as a miss.
    pub async fn article_matching(&self, relevant: Vec<Document>) -> Result<CacheSplit> {
        let lookups = relevant.iter().map(|doc| async move {
            match self.lookup(&doc.pmid).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(pmid = %doc.pmid, "unreadable cache record, reprocessing: {:#}", e);
                    None
                }
            }
        });
        let found = join_all(lookups).await;

        let mut split = CacheSplit::default();
        for (doc, record) in relevant.into_iter().zip(found) {
            match record {
                Some(record) => split.matched.push(Document::from(record)),
                None => split.to_process.push(doc),
            }
        }
        info!(
            matched = split.matched.len(),
            to_process = split.to_process.len(),
            "cache partition"
        );
        Ok(split)
    }

    /// Upsert the cache subset of each document. Later duplicates of a PMID
    /// in `docs` overwrite earlier ones.
    pub async fn write_articles(&self, docs: &[Document]) -> Result<()> {
        let mut entries: HashMap<String, Vec<u8>> = HashMap::new();
        for doc in docs {
            let value = serde_json::to_vec(&doc.to_record()).context("serialize ReliabilityRecord")?;
            entries.insert(doc.pmid.clone(), value);
        }
        let count = entries.len();
        self.store
            .upsert_many(Table::Articles, entries.into_iter().collect())
            .await?;
        debug!(count, "reliability records written");
        Ok(())
    }

    /// Every stored record, ordered by PMID.
    pub async fn list_records(&self) -> Result<Vec<ReliabilityRecord>> {
        let mut records: Vec<ReliabilityRecord> = self
            .store
            .scan(Table::Articles)
            .await?
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_slice(&value) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(pmid = %key, "skipping unreadable record: {}", e);
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| a.pmid.cmp(&b.pmid));
        Ok(records)
    }
}
