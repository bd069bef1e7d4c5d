//! Request-level entry points
//!
//! `ChatService` assigns session ids, runs either the answer router or the
//! agent manager, and hands a `ConversationRecord` to the configured sink.
//! A failing sink never affects the response.

use crate::router::AnswerSourceRouter;
use crate::sink::ConversationSink;
use crate::types::{AgentResponse, ChatResponse, ConversationRecord};
use lemo_agents::{AgentInfo, AgentManager};
use lemo_common::{Result, current_timestamp_millis, generate_session_id};
use lemo_llm::ChatTurn;
use lemo_memory::KnowledgeId;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct ChatService {
    router: AnswerSourceRouter,
    agents: AgentManager,
    sink: Arc<dyn ConversationSink>,
}

struct Exchange<'a> {
    session_id: &'a str,
    user_id: Option<String>,
    message: &'a str,
    answer: &'a str,
    intent: Option<String>,
    confidence: f32,
    linked_knowledge_id: Option<KnowledgeId>,
}

impl ChatService {
    pub fn new(
        router: AnswerSourceRouter,
        agents: AgentManager,
        sink: Arc<dyn ConversationSink>,
    ) -> Self {
        Self {
            router,
            agents,
            sink,
        }
    }

    pub fn router(&self) -> &AnswerSourceRouter {
        &self.router
    }

    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.list_agents()
    }

    /// Answer a message through the knowledge / web / general chain
    pub async fn answer(
        &self,
        message: &str,
        session_id: Option<String>,
        user_id: Option<String>,
    ) -> ChatResponse {
        self.answer_with_history(message, session_id, user_id, &[])
            .await
    }

    pub async fn answer_with_history(
        &self,
        message: &str,
        session_id: Option<String>,
        user_id: Option<String>,
        history: &[ChatTurn],
    ) -> ChatResponse {
        let started = Instant::now();
        let session_id = resolve_session_id(session_id);

        let routed = self.router.route(message, history).await;
        let linked_knowledge_id = routed.candidate.linked_knowledge_id();
        let response = ChatResponse::new(session_id, routed);

        let latency_ms = self
            .persist(
                Exchange {
                    session_id: &response.session_id,
                    user_id,
                    message,
                    answer: &response.answer,
                    intent: response.intent.clone(),
                    confidence: response.confidence,
                    linked_knowledge_id,
                },
                started,
            )
            .await;

        info!(
            "Answered session={} latency={}ms confidence={:.2} source={}",
            response.session_id, latency_ms, response.confidence, response.answer_source
        );
        response
    }

    /// Answer a message through the agent bidding path
    ///
    /// Fails only when no agents are registered.
    pub async fn answer_with_agents(
        &self,
        message: &str,
        session_id: Option<String>,
        user_id: Option<String>,
        history: &[ChatTurn],
    ) -> Result<AgentResponse> {
        let started = Instant::now();
        let session_id = resolve_session_id(session_id);

        let result = self.agents.chat(message, history).await?;
        let response = AgentResponse {
            session_id,
            agent_name: result.agent_name,
            answer: result.reply.answer,
            answer_source: result.reply.answer_source,
            confidence: result.reply.confidence,
            tools_used: result.reply.tools_used,
        };

        let latency_ms = self
            .persist(
                Exchange {
                    session_id: &response.session_id,
                    user_id,
                    message,
                    answer: &response.answer,
                    intent: None,
                    confidence: response.confidence,
                    linked_knowledge_id: None,
                },
                started,
            )
            .await;

        info!(
            "Agent {} answered session={} latency={}ms confidence={:.2} source={}",
            response.agent_name,
            response.session_id,
            latency_ms,
            response.confidence,
            response.answer_source
        );
        Ok(response)
    }

    /// Write the conversation record; returns the request latency in milliseconds
    async fn persist(&self, exchange: Exchange<'_>, started: Instant) -> u64 {
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let record = ConversationRecord {
            session_id: exchange.session_id.to_string(),
            user_id: exchange.user_id,
            user_message: exchange.message.to_string(),
            bot_answer: exchange.answer.to_string(),
            intent: exchange.intent,
            confidence: exchange.confidence,
            linked_knowledge_id: exchange.linked_knowledge_id,
            latency_ms,
            timestamp: current_timestamp_millis(),
        };

        if let Err(e) = self.sink.record(&record).await {
            warn!("Failed to record conversation {}: {}", record.session_id, e);
        }
        latency_ms
    }
}

fn resolve_session_id(session_id: Option<String>) -> String {
    session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_session_id)
}
