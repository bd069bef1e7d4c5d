//! Lemo Tools - Agent tools and external lookups
//!
//! This crate provides the `AiTool` trait with calculator, date/time, web
//! search, encyclopedia and knowledge-base tools, plus the web-search and
//! weather providers those tools and agents call.

pub mod base;
pub mod calc;
pub mod datetime;
pub mod encyclopedia;
pub mod knowledge;
pub mod search;
pub mod weather;

// Re-export key tools for convenience
pub use base::{AiTool, required_str, value_to_text};
pub use calc::{MathTool, evaluate_expression};
pub use datetime::DateTimeTool;
pub use encyclopedia::WikipediaTool;
pub use knowledge::KnowledgeBaseTool;
pub use search::{
    DuckDuckGoSearch, SearchResult, SearxngSearch, WebSearchProvider, WebSearchTool,
    create_search_provider, format_search_context, search_or_empty,
};
pub use weather::{CurrentWeather, QWeatherProvider, WeatherProvider};
