//! Vector index over knowledge embeddings
//!
//! Scores are inner products of unit vectors, so they fall in `[-1, 1]` and
//! behave like cosine similarity. Results are ordered best first.

use crate::embeddings::dot_product;
use async_trait::async_trait;
use lemo_common::{LemoError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Identifier of a knowledge entry in the external store
pub type KnowledgeId = i64;

/// Handle to a stored vector, returned by `upsert`
pub type IndexHandle = u64;

/// A search hit: the knowledge entry and its raw similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub knowledge_id: KnowledgeId,
    pub raw_score: f32,
}

impl Match {
    pub fn new(knowledge_id: KnowledgeId, raw_score: f32) -> Self {
        Self {
            knowledge_id,
            raw_score,
        }
    }
}

/// Storage for embeddings with nearest-neighbour search
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a vector for an external id, replacing any previous vector for it
    async fn upsert(&self, knowledge_id: KnowledgeId, vector: Vec<f32>) -> Result<IndexHandle>;

    /// Up to `top_k` matches, descending by raw score
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>>;

    /// Remove a stored vector; unknown handles are ignored
    async fn delete(&self, handle: IndexHandle) -> Result<()>;

    /// Number of stored vectors
    async fn len(&self) -> usize;
}

struct Entry {
    handle: IndexHandle,
    knowledge_id: KnowledgeId,
    vector: Vec<f32>,
}

/// Brute-force inner-product index held in memory
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: RwLock<Vec<Entry>>,
    next_handle: AtomicU64,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(LemoError::Index(format!(
                "Index expects {} dimensions, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, knowledge_id: KnowledgeId, vector: Vec<f32>) -> Result<IndexHandle> {
        self.check_dimensions(&vector)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.knowledge_id != knowledge_id);
        entries.push(Entry {
            handle,
            knowledge_id,
            vector,
        });
        debug!("Indexed knowledge {} as handle {}", knowledge_id, handle);
        Ok(handle)
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.check_dimensions(vector)?;
        let entries = self.entries.read().await;

        let mut matches = entries
            .iter()
            .map(|entry| Ok(Match::new(entry.knowledge_id, dot_product(vector, &entry.vector)?)))
            .collect::<Result<Vec<_>>>()?;

        matches.sort_by(|a, b| b.raw_score.total_cmp(&a.raw_score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, handle: IndexHandle) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.handle != handle);
        Ok(())
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::normalize;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        normalize(v).unwrap()
    }

    #[tokio::test]
    async fn test_search_orders_descending_and_limits() {
        let index = InMemoryVectorIndex::new(3);
        index.upsert(1, unit(vec![1.0, 0.0, 0.0])).await.unwrap();
        index.upsert(2, unit(vec![1.0, 1.0, 0.0])).await.unwrap();
        index.upsert(3, unit(vec![0.0, 0.0, 1.0])).await.unwrap();

        let matches = index.search(&unit(vec![1.0, 0.2, 0.0]), 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].knowledge_id, 1);
        assert_eq!(matches[1].knowledge_id, 2);
        assert!(matches[0].raw_score >= matches[1].raw_score);
    }

    #[tokio::test]
    async fn test_returns_fewer_than_requested() {
        let index = InMemoryVectorIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 5).await.unwrap().is_empty());

        index.upsert(7, unit(vec![0.0, 1.0])).await.unwrap();
        assert_eq!(index.search(&[1.0, 0.0], 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let index = InMemoryVectorIndex::new(2);
        let first = index.upsert(1, unit(vec![1.0, 0.0])).await.unwrap();
        let second = index.upsert(1, unit(vec![0.0, 1.0])).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(index.len().await, 1);

        index.delete(first).await.unwrap();
        assert_eq!(index.len().await, 1);

        index.delete(second).await.unwrap();
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_index_error() {
        let index = InMemoryVectorIndex::new(3);
        assert!(matches!(
            index.upsert(1, vec![1.0]).await,
            Err(LemoError::Index(_))
        ));
        assert!(matches!(
            index.search(&[1.0], 1).await,
            Err(LemoError::Index(_))
        ));
    }
}
