//! Lemo LLM - Language model integration
//!
//! This crate provides the generation provider, the prompt templates used for
//! each answer strategy, and intent classification.

pub mod intent;
pub mod prompts;
pub mod provider;

// Re-export key types for convenience
pub use intent::{INTENT_LABELS, detect_intent, parse_intent};
pub use prompts::{AnswerStrategy, intent_prompt};
pub use provider::{ChatTurn, GenaiGenerationProvider, GenerationProvider, TurnRole, recent_history};
