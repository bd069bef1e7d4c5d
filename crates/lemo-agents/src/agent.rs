//! Core trait for specialised agents

use async_trait::async_trait;
use lemo_common::Result;
use lemo_llm::ChatTurn;
use serde::{Deserialize, Serialize};

/// An agent's answer to one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub answer: String,
    pub answer_source: String,
    pub confidence: f32,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

impl AgentReply {
    pub fn new(answer: impl Into<String>, answer_source: &str, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            answer_source: answer_source.to_string(),
            confidence,
            tools_used: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools_used: Vec<String>) -> Self {
        self.tools_used = tools_used;
        self
    }
}

/// Public description of a registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub tools: Vec<String>,
    pub is_default: bool,
}

/// A question handler that bids for messages it is suited to
#[async_trait]
pub trait SpecializedAgent: Send + Sync {
    /// Human-readable name, also used to tag results
    fn name(&self) -> &str;

    /// What kind of questions this agent handles
    fn description(&self) -> &str;

    /// Names of the tools or steps this agent may use
    fn tools(&self) -> Vec<String>;

    /// Bid for a message: whether this agent can answer it and how confident it is
    async fn can_handle(&self, message: &str) -> Result<(bool, f32)>;

    /// Answer a message; failures are folded into a degraded reply
    async fn chat(&self, message: &str, history: &[ChatTurn]) -> AgentReply;
}
