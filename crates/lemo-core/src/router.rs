//! Answer-source routing
//!
//! Chooses between the knowledge base, web search and plain generation for a
//! question, based on the calibrated confidence of the best knowledge match:
//!
//! - no usable match, or confidence below `web_threshold`: web search, and
//!   plain generation when the search comes back empty
//! - confidence at or above `strict_threshold`: answer strictly from the
//!   knowledge base
//! - anything in between: knowledge offered as optional context

use crate::types::{AnswerCandidate, RoutedAnswer, SourceRef};
use lemo_common::{LemoConfig, ScoringConfig, preview, sources};
use lemo_llm::{AnswerStrategy, ChatTurn, GenerationProvider, detect_intent, recent_history};
use lemo_memory::{ConfidenceScorer, KnowledgeBase, Match};
use lemo_tools::{WebSearchProvider, format_search_context, search_or_empty};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Routes a question through the knowledge base, web search and general fallback chain
pub struct AnswerSourceRouter {
    knowledge: Arc<KnowledgeBase>,
    generator: Arc<dyn GenerationProvider>,
    search: Arc<dyn WebSearchProvider>,
    scorer: ConfidenceScorer,
    scoring: ScoringConfig,
    search_max_results: usize,
    search_timeout: Duration,
    max_context_turns: usize,
}

impl AnswerSourceRouter {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        generator: Arc<dyn GenerationProvider>,
        search: Arc<dyn WebSearchProvider>,
        config: &LemoConfig,
    ) -> Self {
        Self {
            knowledge,
            generator,
            search,
            scorer: ConfidenceScorer::new(config.scoring.baseline),
            scoring: config.scoring.clone(),
            search_max_results: config.search.max_results,
            search_timeout: Duration::from_secs(config.search.timeout_seconds),
            max_context_turns: config.llm.max_context_turns,
        }
    }

    pub fn scorer(&self) -> ConfidenceScorer {
        self.scorer
    }

    /// Answer a question and classify its intent
    pub async fn route(&self, question: &str, history: &[ChatTurn]) -> RoutedAnswer {
        let history = recent_history(history, self.max_context_turns);
        let (candidate, intent) = tokio::join!(
            self.answer(question, history),
            detect_intent(self.generator.as_ref(), question)
        );
        RoutedAnswer { candidate, intent }
    }

    async fn answer(&self, question: &str, history: &[ChatTurn]) -> AnswerCandidate {
        let matches = match self.retrieve(question).await {
            Some(matches) => matches,
            None => return self.general_answer(question, history).await,
        };

        let preliminary = self.scorer.best(matches.iter().map(|m| m.raw_score));
        if matches.is_empty() || preliminary < self.scoring.web_threshold {
            info!(
                "Knowledge confidence {:.2} below {:.2}, trying web search",
                preliminary, self.scoring.web_threshold
            );
            return self.web_answer(question, history).await;
        }

        match self.knowledge_answer(question, &matches, history).await {
            Some(candidate) => candidate,
            None => {
                info!("No matched knowledge entry is active, trying web search");
                self.web_answer(question, history).await
            }
        }
    }

    /// Embed and search; `None` when the question cannot be embedded
    async fn retrieve(&self, question: &str) -> Option<Vec<Match>> {
        let vector = match self.knowledge.embedder().embed_text(question).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Embedding failed, skipping knowledge base: {}", e);
                return None;
            }
        };

        match self.knowledge.index().search(&vector, self.scoring.top_k).await {
            Ok(matches) => {
                debug!(
                    "Index returned {} matches: {:?}",
                    matches.len(),
                    matches.iter().map(|m| (m.knowledge_id, m.raw_score)).collect::<Vec<_>>()
                );
                Some(matches)
            }
            Err(e) => {
                warn!("Vector index unavailable, treating as no matches: {}", e);
                Some(Vec::new())
            }
        }
    }

    async fn generate(
        &self,
        strategy: AnswerStrategy,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Option<String> {
        let prompt = strategy.user_prompt(question, context);
        match self
            .generator
            .generate(strategy.system_prompt(), &prompt, history)
            .await
        {
            Ok(answer) => {
                debug!("{:?} answer: {}", strategy, preview(&answer, 100));
                Some(answer)
            }
            Err(e) => {
                warn!("Answer generation failed ({:?}): {}", strategy, e);
                None
            }
        }
    }

    /// Answer from the top knowledge matches; `None` when none of them resolve
    async fn knowledge_answer(
        &self,
        question: &str,
        matches: &[Match],
        history: &[ChatTurn],
    ) -> Option<AnswerCandidate> {
        let ids: Vec<_> = matches.iter().map(|m| m.knowledge_id).collect();
        let entries = match self.knowledge.store().fetch_active(&ids).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Knowledge store lookup failed: {}", e);
                HashMap::new()
            }
        };

        let resolved: Vec<_> = matches
            .iter()
            .take(self.scoring.context_matches)
            .filter_map(|m| entries.get(&m.knowledge_id).map(|entry| (m, entry)))
            .collect();
        if resolved.is_empty() {
            return None;
        }

        let context = resolved
            .iter()
            .map(|(_, entry)| format!("问题：{}\n答案：{}", entry.question, entry.answer))
            .collect::<Vec<_>>()
            .join("\n\n");
        let cited = resolved
            .iter()
            .map(|(m, entry)| SourceRef::Knowledge {
                id: entry.id,
                question: entry.question.clone(),
                similarity: self.scorer.score(m.raw_score),
            })
            .collect();
        let related_questions = matches
            .iter()
            .skip(1)
            .take(self.scoring.related_questions)
            .filter_map(|m| entries.get(&m.knowledge_id))
            .map(|entry| entry.question.clone())
            .collect();

        let confidence = self.scorer.best(matches.iter().map(|m| m.raw_score));
        let (strategy, answer_source) = if confidence >= self.scoring.strict_threshold {
            (AnswerStrategy::Strict, sources::KNOWLEDGE_BASE)
        } else {
            (AnswerStrategy::Blended, sources::GENERAL_AI)
        };
        debug!("Knowledge confidence {:.2}, strategy {:?}", confidence, strategy);

        let Some(answer) = self.generate(strategy, question, &context, history).await else {
            return Some(AnswerCandidate::apology());
        };
        Some(
            AnswerCandidate::new(answer, answer_source, confidence)
                .with_sources(cited)
                .with_related_questions(related_questions),
        )
    }

    async fn web_answer(&self, question: &str, history: &[ChatTurn]) -> AnswerCandidate {
        let search = search_or_empty(self.search.as_ref(), question, self.search_max_results);
        let results = match timeout(self.search_timeout, search).await {
            Ok(results) => results,
            Err(_) => {
                warn!("Web search timed out after {:?}", self.search_timeout);
                Vec::new()
            }
        };
        if results.is_empty() {
            return self.general_answer(question, history).await;
        }

        let context = format_search_context(&results);
        let Some(answer) = self
            .generate(AnswerStrategy::Web, question, &context, history)
            .await
        else {
            return AnswerCandidate::apology();
        };

        let cited = results
            .into_iter()
            .map(|r| SourceRef::Web {
                title: r.title,
                url: r.url,
                similarity: 0.0,
            })
            .collect();
        AnswerCandidate::new(answer, sources::WEB_SEARCH, self.scoring.web_confidence)
            .with_sources(cited)
    }

    async fn general_answer(&self, question: &str, history: &[ChatTurn]) -> AnswerCandidate {
        match self
            .generate(AnswerStrategy::General, question, "", history)
            .await
        {
            Some(answer) => AnswerCandidate::new(answer, sources::GENERAL_AI, 0.0),
            None => AnswerCandidate::apology(),
        }
    }
}
