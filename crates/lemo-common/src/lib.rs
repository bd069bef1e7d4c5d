//! Lemo Common - Shared utilities and types
//!
//! This crate provides the error type, configuration structs, constants
//! and utility functions used across all Lemo components.

pub mod config;
pub mod constants;
pub mod error;
pub mod utils;

// Re-export commonly used items
pub use config::{
    AgentsConfig, EmbeddingConfig, EmbeddingProviderKind, EncyclopediaConfig, LemoConfig,
    LlmConfig, LoggingConfig, ScoringConfig, SearchConfig, SearchProviderKind, StorageConfig,
    WeatherConfig,
};
pub use constants::*;
pub use error::{LemoError, Result};
pub use utils::*;
