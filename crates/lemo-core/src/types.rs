//! Request outputs and conversation records

use lemo_common::{messages, sources};
use lemo_memory::KnowledgeId;
use serde::{Deserialize, Serialize};

/// Evidence an answer was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceRef {
    /// A knowledge entry; `similarity` is the calibrated confidence of the match
    Knowledge {
        id: KnowledgeId,
        question: String,
        similarity: f32,
    },
    /// A web search hit; similarity is always 0 for unverified results
    Web {
        title: String,
        url: String,
        similarity: f32,
    },
}

impl SourceRef {
    pub fn knowledge_id(&self) -> Option<KnowledgeId> {
        match self {
            SourceRef::Knowledge { id, .. } => Some(*id),
            SourceRef::Web { .. } => None,
        }
    }
}

/// A generated answer and the metadata describing how it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    pub answer: String,
    pub answer_source: String,
    pub confidence: f32,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub related_questions: Vec<String>,
}

impl AnswerCandidate {
    pub fn new(answer: impl Into<String>, answer_source: &str, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            answer_source: answer_source.to_string(),
            confidence,
            sources: Vec::new(),
            related_questions: Vec::new(),
        }
    }

    /// Fixed apology returned when generation fails
    pub fn apology() -> Self {
        Self::new(messages::GENERATION_APOLOGY, sources::ERROR, 0.0)
    }

    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_related_questions(mut self, related_questions: Vec<String>) -> Self {
        self.related_questions = related_questions;
        self
    }

    /// Id of the first knowledge entry cited, if any
    pub fn linked_knowledge_id(&self) -> Option<KnowledgeId> {
        self.sources.iter().find_map(SourceRef::knowledge_id)
    }
}

/// Router output: the answer plus the classified intent
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedAnswer {
    pub candidate: AnswerCandidate,
    pub intent: String,
}

/// Response of the knowledge / web / general answer path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<SourceRef>,
    pub related_questions: Vec<String>,
    pub intent: Option<String>,
    pub answer_source: String,
}

impl ChatResponse {
    pub fn new(session_id: String, routed: RoutedAnswer) -> Self {
        let RoutedAnswer { candidate, intent } = routed;
        Self {
            session_id,
            answer: candidate.answer,
            confidence: candidate.confidence,
            sources: candidate.sources,
            related_questions: candidate.related_questions,
            intent: Some(intent),
            answer_source: candidate.answer_source,
        }
    }
}

/// Response of the agent bidding path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub session_id: String,
    pub agent_name: String,
    pub answer: String,
    pub answer_source: String,
    pub confidence: f32,
    pub tools_used: Vec<String>,
}

/// One answered request, appended to the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub session_id: String,
    pub user_id: Option<String>,
    pub user_message: String,
    pub bot_answer: String,
    pub intent: Option<String>,
    pub confidence: f32,
    pub linked_knowledge_id: Option<KnowledgeId>,
    pub latency_ms: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}
