//! Lemo Common Error Types
//!
//! Centralized error handling for all Lemo components. The variants follow the
//! failure classes the answer pipeline distinguishes between, so callers can
//! decide which ones degrade an answer and which ones are fatal.

use std::fmt;

/// Main error type for Lemo operations
#[derive(Debug)]
pub enum LemoError {
    /// Generic error with message
    Generic(String),
    /// IO-related errors
    Io(std::io::Error),
    /// Serialization/deserialization errors
    Serde(serde_json::Error),
    /// Configuration errors (invalid values, unreadable files, empty registry)
    Config(String),
    /// Embedding provider failures
    Embedding(String),
    /// Vector index unavailable or rejected the request
    Index(String),
    /// Language-model generation failures
    Generation(String),
    /// Web-search provider failures and timeouts
    Search(String),
    /// Weather provider failures; the message is user-presentable
    Weather(String),
    /// Tool execution errors
    Tool(String),
    /// Agent routing/handling errors
    Agent(String),
    /// Knowledge/conversation storage errors
    Storage(String),
}

impl LemoError {
    /// The reason carried by this error without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            LemoError::Io(err) => err.to_string(),
            LemoError::Serde(err) => err.to_string(),
            LemoError::Generic(msg)
            | LemoError::Config(msg)
            | LemoError::Embedding(msg)
            | LemoError::Index(msg)
            | LemoError::Generation(msg)
            | LemoError::Search(msg)
            | LemoError::Weather(msg)
            | LemoError::Tool(msg)
            | LemoError::Agent(msg)
            | LemoError::Storage(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for LemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LemoError::Generic(msg) => write!(f, "Lemo error: {}", msg),
            LemoError::Io(err) => write!(f, "IO error: {}", err),
            LemoError::Serde(err) => write!(f, "Serialization error: {}", err),
            LemoError::Config(msg) => write!(f, "Configuration error: {}", msg),
            LemoError::Embedding(msg) => write!(f, "Embedding error: {}", msg),
            LemoError::Index(msg) => write!(f, "Vector index error: {}", msg),
            LemoError::Generation(msg) => write!(f, "Generation error: {}", msg),
            LemoError::Search(msg) => write!(f, "Search error: {}", msg),
            LemoError::Weather(msg) => write!(f, "Weather error: {}", msg),
            LemoError::Tool(msg) => write!(f, "Tool error: {}", msg),
            LemoError::Agent(msg) => write!(f, "Agent error: {}", msg),
            LemoError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for LemoError {}

/// Convenience result type for Lemo operations
pub type Result<T> = std::result::Result<T, LemoError>;

impl From<std::io::Error> for LemoError {
    fn from(err: std::io::Error) -> Self {
        LemoError::Io(err)
    }
}

impl From<serde_json::Error> for LemoError {
    fn from(err: serde_json::Error) -> Self {
        LemoError::Serde(err)
    }
}

impl From<toml::de::Error> for LemoError {
    fn from(err: toml::de::Error) -> Self {
        LemoError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for LemoError {
    fn from(err: anyhow::Error) -> Self {
        LemoError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_category() {
        let err = LemoError::Weather("未找到城市：火星".to_string());
        assert_eq!(err.to_string(), "Weather error: 未找到城市：火星");
        assert_eq!(err.reason(), "未找到城市：火星");
    }

    #[test]
    fn test_from_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(LemoError::from(io), LemoError::Io(_)));

        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(LemoError::from(serde_err), LemoError::Serde(_)));

        let toml_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        assert!(matches!(LemoError::from(toml_err), LemoError::Config(_)));
    }
}
