//! Knowledge base lookup exposed as a tool

use crate::base::{AiTool, required_str};
use anyhow::Error;
use async_trait::async_trait;
use lemo_common::retrieval;
use lemo_memory::{ConfidenceScorer, KnowledgeBase};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const NO_MATCH: &str = "知识库中未找到相关信息。";
const NO_RELEVANT_MATCH: &str = "知识库中未找到足够相关的信息。";

/// Searches curated Q&A pairs and returns the sufficiently confident ones
pub struct KnowledgeBaseTool {
    knowledge: Arc<KnowledgeBase>,
    scorer: ConfidenceScorer,
    top_k: usize,
    min_confidence: f32,
}

impl KnowledgeBaseTool {
    pub fn new(knowledge: Arc<KnowledgeBase>, scorer: ConfidenceScorer) -> Self {
        Self {
            knowledge,
            scorer,
            top_k: retrieval::CONTEXT_MATCHES,
            min_confidence: retrieval::KNOWLEDGE_TOOL_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub async fn query(&self, query: &str) -> Result<String, Error> {
        let vector = self.knowledge.embedder().embed_text(query).await?;
        let matches = self.knowledge.index().search(&vector, self.top_k).await?;
        if matches.is_empty() {
            return Ok(NO_MATCH.to_string());
        }

        let ids: Vec<_> = matches.iter().map(|m| m.knowledge_id).collect();
        let entries = self.knowledge.store().fetch_active(&ids).await?;

        let found: Vec<String> = matches
            .iter()
            .filter_map(|m| {
                let entry = entries.get(&m.knowledge_id)?;
                let confidence = self.scorer.score(m.raw_score);
                (confidence >= self.min_confidence).then(|| {
                    format!(
                        "问题：{}\n答案：{}\n相似度：{:.2}%",
                        entry.question,
                        entry.answer,
                        confidence * 100.0
                    )
                })
            })
            .collect();

        debug!("Knowledge tool kept {} of {} matches", found.len(), matches.len());
        if found.is_empty() {
            return Ok(NO_RELEVANT_MATCH.to_string());
        }
        Ok(found.join("\n\n"))
    }
}

#[async_trait]
impl AiTool for KnowledgeBaseTool {
    fn name(&self) -> &str {
        "knowledge_base"
    }

    fn description(&self) -> &str {
        "查询公司内部知识库，获取客服相关问题的标准答案。适用于：退货政策、订单查询、产品信息、售后服务等公司业务相关问题。输入：用户的问题"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, Error> {
        let query = required_str(&params, "query")?;
        Ok(Value::String(self.query(query).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lemo_common::{EmbeddingConfig, EmbeddingProviderKind};
    use lemo_memory::{
        InMemoryKnowledgeStore, InMemoryVectorIndex, KnowledgeEntry, KnowledgeStatus,
        MockEmbeddingService,
    };
    use serde_json::json;

    async fn knowledge_base() -> Arc<KnowledgeBase> {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::Mock,
            dimensions: 256,
            ..Default::default()
        };
        let kb = KnowledgeBase::new(
            Arc::new(MockEmbeddingService::new(config)),
            Arc::new(InMemoryVectorIndex::new(256)),
            Arc::new(InMemoryKnowledgeStore::new()),
        );
        kb.ingest(KnowledgeEntry::new(1, "如何申请退货", "在订单详情页点击申请退货。"))
            .await
            .unwrap();
        Arc::new(kb)
    }

    #[tokio::test]
    async fn test_exact_question_is_returned() {
        let tool = KnowledgeBaseTool::new(knowledge_base().await, ConfidenceScorer::default());
        let result = tool.execute(json!({"query": "如何申请退货"})).await.unwrap();
        let text = result.as_str().unwrap();
        assert!(text.contains("答案：在订单详情页点击申请退货。"));
        assert!(text.contains("相似度：100.00%"));
    }

    #[tokio::test]
    async fn test_threshold_filters_matches() {
        let tool = KnowledgeBaseTool::new(knowledge_base().await, ConfidenceScorer::default())
            .with_min_confidence(1.1);
        let result = tool.query("如何申请退货").await.unwrap();
        assert_eq!(result, NO_RELEVANT_MATCH);
    }

    #[tokio::test]
    async fn test_disabled_entries_are_hidden() {
        let kb = knowledge_base().await;
        let mut entry = KnowledgeEntry::new(1, "如何申请退货", "旧答案");
        entry.status = KnowledgeStatus::Disabled;
        kb.ingest(entry).await.unwrap();

        let tool = KnowledgeBaseTool::new(kb, ConfidenceScorer::default());
        assert_eq!(tool.query("如何申请退货").await.unwrap(), NO_RELEVANT_MATCH);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let kb = knowledge_base().await;
        kb.remove(1).await.unwrap();
        let tool = KnowledgeBaseTool::new(kb, ConfidenceScorer::default());
        assert_eq!(tool.query("退货").await.unwrap(), NO_MATCH);
    }
}
