//! Lemo Core - Answer pipeline
//!
//! This crate ties the retrieval, generation, search and agent layers together:
//! - `AnswerSourceRouter` picks knowledge base, web search or general generation
//!   from the calibrated confidence of the best match
//! - `ChatService` is the request entry point for both the router and the
//!   agent bidding path
//! - `ConversationSink` persists one record per answered request

pub mod router;
pub mod service;
pub mod sink;
pub mod types;

// Re-export key types for convenience
pub use router::AnswerSourceRouter;
pub use service::ChatService;
pub use sink::{ConversationSink, JsonlConversationSink, NoopConversationSink};
pub use types::{
    AgentResponse, AnswerCandidate, ChatResponse, ConversationRecord, RoutedAnswer, SourceRef,
};
