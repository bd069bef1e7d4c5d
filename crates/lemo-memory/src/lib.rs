//! Lemo Memory - Retrieval layer
//!
//! This crate provides confidence calibration, embedding services, the vector
//! index and the knowledge store the answer pipeline retrieves from.

pub mod embeddings;
pub mod index;
pub mod knowledge;
pub mod scoring;

// Re-export commonly used types
pub use embeddings::{
    EmbeddingService, EmbeddingServiceFactory, MockEmbeddingService, OllamaEmbeddingService,
    OpenAIEmbeddingService, dot_product, normalize,
};
pub use index::{InMemoryVectorIndex, IndexHandle, KnowledgeId, Match, VectorIndex};
pub use knowledge::{
    InMemoryKnowledgeStore, KnowledgeBase, KnowledgeEntry, KnowledgeStatus, KnowledgeStore,
};
pub use scoring::ConfidenceScorer;

// Re-export from lemo-common for convenience
pub use lemo_common::{LemoError, Result};
