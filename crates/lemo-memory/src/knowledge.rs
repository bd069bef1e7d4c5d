//! Knowledge entries and the store that resolves search hits to content
//!
//! Administrative CRUD lives outside this crate; `KnowledgeBase` is the seam it
//! calls into so that the store and the vector index stay in step.

use crate::embeddings::EmbeddingService;
use crate::index::{IndexHandle, KnowledgeId, VectorIndex};
use async_trait::async_trait;
use lemo_common::{LemoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Whether an entry may be served to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeStatus {
    #[default]
    Active,
    Disabled,
}

/// A curated question/answer pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: KnowledgeId,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: KnowledgeStatus,
}

impl KnowledgeEntry {
    pub fn new(id: KnowledgeId, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id,
            question: question.into(),
            answer: answer.into(),
            category: None,
            status: KnowledgeStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == KnowledgeStatus::Active
    }
}

/// Storage for knowledge content keyed by id
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Active entries among `ids`; missing or disabled ids are omitted
    async fn fetch_active(&self, ids: &[KnowledgeId]) -> Result<HashMap<KnowledgeId, KnowledgeEntry>>;

    async fn put(&self, entry: KnowledgeEntry) -> Result<()>;

    async fn remove(&self, id: KnowledgeId) -> Result<Option<KnowledgeEntry>>;
}

/// Knowledge store held in memory
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    entries: RwLock<HashMap<KnowledgeId, KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn fetch_active(&self, ids: &[KnowledgeId]) -> Result<HashMap<KnowledgeId, KnowledgeEntry>> {
        let entries = self.entries.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| entries.get(id))
            .filter(|entry| entry.is_active())
            .map(|entry| (entry.id, entry.clone()))
            .collect())
    }

    async fn put(&self, entry: KnowledgeEntry) -> Result<()> {
        self.entries.write().await.insert(entry.id, entry);
        Ok(())
    }

    async fn remove(&self, id: KnowledgeId) -> Result<Option<KnowledgeEntry>> {
        Ok(self.entries.write().await.remove(&id))
    }
}

/// Keeps the knowledge store and the vector index consistent
pub struct KnowledgeBase {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn KnowledgeStore>,
    handles: RwLock<HashMap<KnowledgeId, IndexHandle>>,
}

impl KnowledgeBase {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingService> {
        self.embedder.clone()
    }

    pub fn index(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }

    pub fn store(&self) -> Arc<dyn KnowledgeStore> {
        self.store.clone()
    }

    /// Store an entry and index the embedding of its question
    pub async fn ingest(&self, entry: KnowledgeEntry) -> Result<IndexHandle> {
        let vector = self.embedder.embed_text(&entry.question).await?;
        let id = entry.id;
        self.store.put(entry).await?;
        let handle = self.index.upsert(id, vector).await?;

        let previous = self.handles.write().await.insert(id, handle);
        if let Some(previous) = previous.filter(|p| *p != handle) {
            self.index.delete(previous).await?;
        }
        debug!("Ingested knowledge {} (handle {})", id, handle);
        Ok(handle)
    }

    /// Ingest many entries, skipping ones that fail to embed
    pub async fn ingest_all(&self, entries: Vec<KnowledgeEntry>) -> Result<usize> {
        let mut ingested = 0;
        for entry in entries {
            let id = entry.id;
            match self.ingest(entry).await {
                Ok(_) => ingested += 1,
                Err(e) => warn!("Skipping knowledge {}: {}", id, e),
            }
        }
        info!("Ingested {} knowledge entries", ingested);
        Ok(ingested)
    }

    /// Remove an entry from both the store and the index
    pub async fn remove(&self, id: KnowledgeId) -> Result<bool> {
        if let Some(handle) = self.handles.write().await.remove(&id) {
            self.index.delete(handle).await?;
        }
        Ok(self.store.remove(id).await?.is_some())
    }

    /// Read a JSON array of entries from disk
    pub fn load_entries<P: AsRef<Path>>(path: P) -> Result<Vec<KnowledgeEntry>> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LemoError::Storage(format!("Failed to read knowledge file {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write entries to disk as a JSON array, creating parent directories
    pub fn save_entries<P: AsRef<Path>>(path: P, entries: &[KnowledgeEntry]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(path, content).map_err(|e| {
            LemoError::Storage(format!("Failed to write knowledge file {:?}: {}", path, e))
        })
    }

    /// Merge entries into the knowledge file at `path`; entries with an existing id replace it
    ///
    /// A missing file starts empty. Returns the merged contents as written.
    pub fn merge_into_file<P: AsRef<Path>>(
        path: P,
        entries: Vec<KnowledgeEntry>,
    ) -> Result<Vec<KnowledgeEntry>> {
        let path = path.as_ref();
        let mut merged = if path.exists() {
            Self::load_entries(path)?
        } else {
            Vec::new()
        };

        for entry in entries {
            match merged.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => merged.push(entry),
            }
        }

        Self::save_entries(path, &merged)?;
        info!("Wrote {} knowledge entries to {:?}", merged.len(), path);
        Ok(merged)
    }
}
