//! Bidding router over specialised agents
//!
//! Every registered agent bids on each message. The highest bid strictly above
//! the route threshold wins; otherwise the default agent (or the first one
//! registered) answers.

use crate::agent::{AgentInfo, AgentReply, SpecializedAgent};
use futures::future::join_all;
use lemo_common::{LemoError, Result};
use lemo_llm::ChatTurn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An agent's reply tagged with the agent that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChatResult {
    pub agent_name: String,
    #[serde(flatten)]
    pub reply: AgentReply,
}

/// Registry of agents, populated at startup and read-only afterwards
pub struct AgentManager {
    agents: Vec<Arc<dyn SpecializedAgent>>,
    default_agent: Option<usize>,
    route_threshold: f32,
}

impl AgentManager {
    pub fn new(route_threshold: f32) -> Self {
        Self {
            agents: Vec::new(),
            default_agent: None,
            route_threshold,
        }
    }

    /// Register an agent; a later default replaces an earlier one
    pub fn register(&mut self, agent: Arc<dyn SpecializedAgent>, is_default: bool) {
        info!("Registering agent {} (default: {})", agent.name(), is_default);
        if is_default {
            if let Some(previous) = self.default_agent {
                warn!(
                    "Default agent {} replaced by {}",
                    self.agents[previous].name(),
                    agent.name()
                );
            }
            self.default_agent = Some(self.agents.len());
        }
        self.agents.push(agent);
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Collect one bid per agent, in registration order
    async fn collect_bids(&self, message: &str) -> Vec<(bool, f32)> {
        let bids = join_all(self.agents.iter().map(|agent| agent.can_handle(message))).await;

        bids.into_iter()
            .zip(&self.agents)
            .map(|(bid, agent)| match bid {
                Ok((can_handle, confidence)) => {
                    debug!("{} bid ({}, {:.2})", agent.name(), can_handle, confidence);
                    (can_handle, confidence)
                }
                Err(e) => {
                    warn!("{} failed to bid: {}", agent.name(), e);
                    (false, 0.0)
                }
            })
            .collect()
    }

    /// Pick the agent that should answer a message
    pub async fn route(&self, message: &str) -> Result<Arc<dyn SpecializedAgent>> {
        if self.agents.is_empty() {
            return Err(LemoError::Agent("No agents registered".to_string()));
        }

        let bids = self.collect_bids(message).await;
        let mut best: Option<usize> = None;
        let mut best_confidence = self.route_threshold;
        for (idx, (can_handle, confidence)) in bids.into_iter().enumerate() {
            if can_handle && confidence > best_confidence {
                best = Some(idx);
                best_confidence = confidence;
            }
        }

        let chosen = match best {
            Some(idx) => idx,
            None => self.default_agent.unwrap_or(0),
        };
        let agent = self.agents[chosen].clone();
        info!(
            "Routed message to {} (confidence {:.2}, winner: {})",
            agent.name(),
            best_confidence,
            best.is_some()
        );
        Ok(agent)
    }

    /// Route a message and let the chosen agent answer it
    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<AgentChatResult> {
        let agent = self.route(message).await?;
        let reply = agent.chat(message, history).await;
        Ok(AgentChatResult {
            agent_name: agent.name().to_string(),
            reply,
        })
    }

    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents
            .iter()
            .enumerate()
            .map(|(idx, agent)| AgentInfo {
                name: agent.name().to_string(),
                description: agent.description().to_string(),
                tools: agent.tools(),
                is_default: self.default_agent == Some(idx),
            })
            .collect()
    }
}
