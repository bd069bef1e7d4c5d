//! Common constants used across Lemo

/// Similarity of a "typical unrelated" pair for nomic-embed-text under inner product
pub const DEFAULT_BASELINE: f32 = 0.58;

/// Default embedding dimension for nomic-embed-text
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Confidence tier boundaries
pub mod tiers {
    /// Below this preliminary confidence the web-search fallback is entered
    pub const WEB_THRESHOLD: f32 = 0.2;
    /// At or above this confidence answers are grounded strictly in the knowledge base
    pub const STRICT_THRESHOLD: f32 = 0.6;
    /// Fixed confidence reported for answers built from unverified search results
    pub const WEB_CONFIDENCE: f32 = 0.1;
}

/// Retrieval defaults
pub mod retrieval {
    pub const DEFAULT_TOP_K: usize = 5;
    pub const CONTEXT_MATCHES: usize = 3;
    pub const RELATED_QUESTIONS: usize = 3;
    pub const KNOWLEDGE_TOOL_MIN_CONFIDENCE: f32 = 0.2;
}

/// Agent routing and reasoning-loop defaults
pub mod agents {
    pub const ROUTE_THRESHOLD: f32 = 0.5;
    pub const MAX_ITERATIONS: usize = 5;
    pub const MAX_EXECUTION_SECS: u64 = 60;
}

/// Default timeout values in seconds
pub mod timeouts {
    pub const DEFAULT_LLM_TIMEOUT: u64 = 60;
    pub const DEFAULT_SEARCH_TIMEOUT: u64 = 10;
    pub const DEFAULT_WEATHER_TIMEOUT: u64 = 10;
    pub const DEFAULT_EMBEDDING_TIMEOUT: u64 = 30;
}

/// Source tags attached to every answer
pub mod sources {
    pub const KNOWLEDGE_BASE: &str = "knowledge_base";
    pub const WEB_SEARCH: &str = "web_search";
    pub const GENERAL_AI: &str = "general_ai";
    pub const ERROR: &str = "error";
    pub const WIKIPEDIA: &str = "wikipedia";
    pub const TOOL: &str = "tool";
    pub const WEATHER_API: &str = "weather_api";
    pub const WEATHER_AGENT: &str = "weather_agent";
}

/// User-facing fallback messages
pub mod messages {
    pub const GENERATION_APOLOGY: &str = "抱歉，系统出现错误，请稍后重试。";
    pub const AGENT_APOLOGY: &str = "抱歉，处理您的问题时出现了错误，请稍后重试。";
    pub const UNKNOWN_INTENT: &str = "其他";
}
