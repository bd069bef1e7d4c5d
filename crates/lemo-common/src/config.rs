//! Configuration types and utilities for Lemo
//!
//! All tunables live in one TOML document. Every section has defaults, so a
//! missing file or a partial file both produce a usable configuration.

use crate::constants::{self, agents, retrieval, tiers, timeouts};
use crate::error::{LemoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LemoConfig {
    pub scoring: ScoringConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub weather: WeatherConfig,
    pub encyclopedia: EncyclopediaConfig,
    pub agents: AgentsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Confidence calibration and retrieval thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Raw similarity of an unrelated pair for the embedding model in use
    pub baseline: f32,
    pub web_threshold: f32,
    pub strict_threshold: f32,
    pub top_k: usize,
    pub context_matches: usize,
    pub related_questions: usize,
    pub web_confidence: f32,
    pub knowledge_tool_min_confidence: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            baseline: constants::DEFAULT_BASELINE,
            web_threshold: tiers::WEB_THRESHOLD,
            strict_threshold: tiers::STRICT_THRESHOLD,
            top_k: retrieval::DEFAULT_TOP_K,
            context_matches: retrieval::CONTEXT_MATCHES,
            related_questions: retrieval::RELATED_QUESTIONS,
            web_confidence: tiers::WEB_CONFIDENCE,
            knowledge_tool_min_confidence: retrieval::KNOWLEDGE_TOOL_MIN_CONFIDENCE,
        }
    }
}

/// Generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name; genai resolves the adapter from it
    pub model: String,
    pub temperature: f64,
    pub timeout_seconds: u64,
    /// Number of most recent history turns forwarded to the model
    pub max_context_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen3:8b".to_string(),
            temperature: 0.7,
            timeout_seconds: timeouts::DEFAULT_LLM_TIMEOUT,
            max_context_turns: 5,
        }
    }
}

/// Available embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderKind {
    /// Ollama embeddings endpoint
    Ollama,
    /// OpenAI-compatible embeddings API
    OpenAI,
    /// Deterministic hash-based vectors for testing
    Mock,
}

/// Configuration for embedding services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: usize,
    /// Longer input is truncated to this many characters
    pub max_text_length: usize,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: Some("http://localhost:11434".to_string()),
            api_key: None,
            dimensions: constants::DEFAULT_EMBEDDING_DIM,
            max_text_length: 8192,
            timeout_seconds: timeouts::DEFAULT_EMBEDDING_TIMEOUT,
        }
    }
}

/// Web-search backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchProviderKind {
    Searxng,
    DuckDuckGo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    pub searxng_url: String,
    pub max_results: usize,
    pub timeout_seconds: u64,
    pub language: String,
    pub snippet_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::Searxng,
            searxng_url: "http://localhost:8888".to_string(),
            max_results: 3,
            timeout_seconds: timeouts::DEFAULT_SEARCH_TIMEOUT,
            language: "zh-CN".to_string(),
            snippet_chars: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: Option<String>,
    pub api_host: String,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_host: "devapi.qweather.com".to_string(),
            timeout_seconds: timeouts::DEFAULT_WEATHER_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncyclopediaConfig {
    pub language: String,
    pub top_k_results: usize,
    pub max_chars: usize,
    pub timeout_seconds: u64,
}

impl Default for EncyclopediaConfig {
    fn default() -> Self {
        Self {
            language: "zh".to_string(),
            top_k_results: 2,
            max_chars: 500,
            timeout_seconds: timeouts::DEFAULT_SEARCH_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// A specialised agent must bid strictly above this to win routing
    pub route_threshold: f32,
    pub max_iterations: usize,
    pub max_execution_seconds: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            route_threshold: agents::ROUTE_THRESHOLD,
            max_iterations: agents::MAX_ITERATIONS,
            max_execution_seconds: agents::MAX_EXECUTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file of knowledge entries loaded at startup
    pub knowledge_path: Option<PathBuf>,
    /// JSON-lines file conversation records are appended to
    pub conversation_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LemoConfig {
    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            debug!("Config file {:?} not found, using defaults", config_path);
            return Ok(Self::default());
        }

        let config_str = std::fs::read_to_string(config_path).map_err(|e| {
            LemoError::Config(format!("Failed to read config file {:?}: {}", config_path, e))
        })?;
        let config: LemoConfig = toml::from_str(&config_str)?;
        debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Override endpoints and secrets from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("LEMO_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.embedding.base_url = Some(url);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            if self.embedding.provider == EmbeddingProviderKind::OpenAI {
                self.embedding.api_key = Some(key);
            }
        }
        if let Some(key) = lookup("QWEATHER_API_KEY") {
            self.weather.api_key = Some(key);
        }
        if let Some(host) = lookup("QWEATHER_API_HOST") {
            self.weather.api_host = host;
        }
        if let Some(url) = lookup("SEARXNG_URL") {
            self.search.searxng_url = url;
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        for (name, value) in [
            ("scoring.web_threshold", s.web_threshold),
            ("scoring.strict_threshold", s.strict_threshold),
            ("scoring.web_confidence", s.web_confidence),
            ("scoring.knowledge_tool_min_confidence", s.knowledge_tool_min_confidence),
            ("agents.route_threshold", self.agents.route_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LemoError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if s.baseline >= 1.0 {
            return Err(LemoError::Config(format!(
                "scoring.baseline must be below 1.0, got {}",
                s.baseline
            )));
        }
        if s.web_threshold > s.strict_threshold {
            return Err(LemoError::Config(format!(
                "scoring.web_threshold ({}) exceeds scoring.strict_threshold ({})",
                s.web_threshold, s.strict_threshold
            )));
        }
        if s.top_k == 0 {
            return Err(LemoError::Config("scoring.top_k must be positive".to_string()));
        }
        if self.agents.max_iterations == 0 {
            return Err(LemoError::Config(
                "agents.max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = LemoConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.scoring.baseline - 0.58).abs() < f32::EPSILON);
        assert_eq!(config.scoring.top_k, 5);
        assert_eq!(config.agents.max_iterations, 5);
        assert_eq!(config.agents.max_execution_seconds, 60);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LemoConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.llm.model, "qwen3:8b");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scoring]\nbaseline = 0.5\nstrict_threshold = 0.7\n\n[search]\nprovider = \"DuckDuckGo\""
        )
        .unwrap();

        let config = LemoConfig::load(file.path()).unwrap();
        assert!((config.scoring.baseline - 0.5).abs() < f32::EPSILON);
        assert!((config.scoring.strict_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.scoring.web_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.search.provider, SearchProviderKind::DuckDuckGo);
        assert_eq!(config.search.max_results, 3);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scoring\nbaseline = ").unwrap();
        let err = LemoConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, LemoError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QWEATHER_API_KEY", "secret"),
            ("SEARXNG_URL", "http://search.local"),
            ("LEMO_LLM_MODEL", "llama3"),
        ]
        .into_iter()
        .collect();

        let mut config = LemoConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.weather.api_key.as_deref(), Some("secret"));
        assert_eq!(config.search.searxng_url, "http://search.local");
        assert_eq!(config.llm.model, "llama3");
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = LemoConfig::default();
        config.scoring.baseline = 1.0;
        assert!(config.validate().is_err());

        let mut config = LemoConfig::default();
        config.scoring.web_threshold = 0.8;
        assert!(config.validate().is_err());

        let mut config = LemoConfig::default();
        config.agents.route_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = LemoConfig::default();
        config.scoring.top_k = 0;
        assert!(config.validate().is_err());
    }
}
