//! Generation provider for interacting with language models
//!
//! The `GenerationProvider` trait is the seam the router and agents call
//! through; `GenaiGenerationProvider` backs it with a `genai` client.

use async_trait::async_trait;
use genai::Client as GenaiClient;
use genai::chat::{ChatMessage as GenaiChatMessage, ChatOptions, ChatRequest, MessageContent};
use lemo_common::{LemoError, LlmConfig, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Speaker of a prior conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior message in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    fn to_genai(&self) -> GenaiChatMessage {
        match self.role {
            TurnRole::User => GenaiChatMessage::user(self.content.clone()),
            TurnRole::Assistant => GenaiChatMessage::assistant(self.content.clone()),
        }
    }
}

/// The last `max_turns` turns of a history
pub fn recent_history(history: &[ChatTurn], max_turns: usize) -> &[ChatTurn] {
    let start = history.len().saturating_sub(max_turns);
    &history[start..]
}

/// Text generation backed by a language model
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a reply to `user_prompt` under `system_prompt`
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String>;

    /// Single-shot completion expected to return one short label
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// Generation provider using the genai client
pub struct GenaiGenerationProvider {
    client: GenaiClient,
    model: String,
    timeout: Duration,
    max_context_turns: usize,
}

impl GenaiGenerationProvider {
    pub fn new(config: &LlmConfig) -> Self {
        let client = GenaiClient::builder()
            .with_chat_options(ChatOptions {
                temperature: Some(config.temperature),
                capture_content: Some(true),
                ..Default::default()
            })
            .build();

        Self {
            client,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            max_context_turns: config.max_context_turns,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn exec(&self, request: ChatRequest) -> Result<String> {
        debug!("Executing chat request against model: {}", self.model);

        let response = tokio::time::timeout(
            self.timeout,
            self.client.exec_chat(&self.model, request, None),
        )
        .await
        .map_err(|_| {
            LemoError::Generation(format!(
                "Model {} timed out after {}s",
                self.model,
                self.timeout.as_secs()
            ))
        })?
        .map_err(|e| LemoError::Generation(format!("GenAI API error: {}", e)))?;

        match response.content.first() {
            Some(MessageContent::Text(text)) => {
                debug!("Model returned {} chars", text.chars().count());
                Ok(text.trim().to_string())
            }
            Some(_) => Err(LemoError::Generation(
                "Model returned non-text content".to_string(),
            )),
            None => Err(LemoError::Generation(
                "No content in chat response".to_string(),
            )),
        }
    }
}

#[async_trait]
impl GenerationProvider for GenaiGenerationProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ChatTurn],
    ) -> Result<String> {
        let mut messages: Vec<GenaiChatMessage> = recent_history(history, self.max_context_turns)
            .iter()
            .map(ChatTurn::to_genai)
            .collect();
        messages.push(GenaiChatMessage::user(user_prompt));

        let request = ChatRequest::new(messages).with_system(system_prompt);
        self.exec(request).await
    }

    async fn classify(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(vec![GenaiChatMessage::user(prompt)]);
        self.exec(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_history_keeps_tail() {
        let history: Vec<ChatTurn> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("q{}", i))
                } else {
                    ChatTurn::assistant(format!("a{}", i))
                }
            })
            .collect();

        let recent = recent_history(&history, 5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "a3");
        assert_eq!(recent[4].content, "a7");

        assert_eq!(recent_history(&history, 20).len(), 8);
        assert!(recent_history(&history, 0).is_empty());
    }

    #[test]
    fn test_chat_turn_serializes_role_lowercase() {
        let json = serde_json::to_string(&ChatTurn::user("你好")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_provider_init() {
        let provider = GenaiGenerationProvider::new(&LlmConfig::default());
        assert_eq!(provider.model(), "qwen3:8b");
        assert_eq!(provider.max_context_turns, 5);
    }
}
