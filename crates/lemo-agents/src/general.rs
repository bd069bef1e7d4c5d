//! General-purpose tool-using agent
//!
//! Runs a bounded reasoning loop against the generation provider. The loop is
//! an explicit state machine (`Thinking -> ToolCall -> Observing -> Thinking`
//! until `Done`) with an iteration cap and a wall-clock budget.

use crate::agent::{AgentReply, SpecializedAgent};
use crate::react::{self, FORMAT_REMINDER, ReactStep, ScratchStep};
use async_trait::async_trait;
use lemo_common::{AgentsConfig, Result, messages, preview, sources};
use lemo_llm::{ChatTurn, GenerationProvider};
use lemo_tools::{AiTool, value_to_text};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

const NO_ANSWER: &str = "抱歉，我暂时无法给出完整的回答，请换个方式提问或稍后重试。";

enum LoopState {
    Thinking,
    ToolCall { log: String, tool: String, input: String },
    Observing { log: String, observation: String },
    Done(LoopOutcome),
}

enum LoopOutcome {
    Answer(String),
    /// Iteration or time budget ran out after at least one step
    Exhausted,
    /// Generation failed or stalled before any step was taken
    Failed,
}

/// Fallback agent that can call knowledge, calculator, date/time, encyclopedia and search tools
pub struct GeneralAgent {
    provider: Arc<dyn GenerationProvider>,
    tools: Vec<Box<dyn AiTool>>,
    max_iterations: usize,
    max_execution: Duration,
}

impl GeneralAgent {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        tools: Vec<Box<dyn AiTool>>,
        config: &AgentsConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            max_iterations: config.max_iterations,
            max_execution: Duration::from_secs(config.max_execution_seconds),
        }
    }

    pub fn with_max_execution(mut self, max_execution: Duration) -> Self {
        self.max_execution = max_execution;
        self
    }

    fn find_tool(&self, name: &str) -> Option<&dyn AiTool> {
        self.tools.iter().find(|t| t.name() == name).map(|b| b.as_ref())
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    async fn run_tool(&self, tool: &dyn AiTool, input: &str, remaining: Duration) -> String {
        let params = react::tool_params(tool, input);
        match timeout(remaining, tool.execute(params)).await {
            Ok(Ok(value)) => {
                let text = value_to_text(&value);
                debug!("Tool {} returned: {}", tool.name(), preview(&text, 200));
                if text.trim().is_empty() {
                    "工具没有返回结果。".to_string()
                } else {
                    text
                }
            }
            Ok(Err(e)) => {
                info!("Tool {} failed: {}", tool.name(), e);
                format!("工具 {} 执行出错：{}", tool.name(), e)
            }
            Err(_) => format!("工具 {} 执行超时", tool.name()),
        }
    }

    /// One last generation asking for a final answer from what was gathered
    async fn forced_answer(
        &self,
        message: &str,
        steps: &[ScratchStep],
        history: &[ChatTurn],
        remaining: Duration,
    ) -> Option<String> {
        if remaining.is_zero() {
            return None;
        }

        let system = react::system_prompt(&self.tools);
        let prompt = react::final_answer_request(message, steps);
        let text = match timeout(remaining, self.provider.generate(&system, &prompt, history)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Forced final answer failed: {}", e);
                return None;
            }
            Err(_) => return None,
        };

        match react::parse_step(&text) {
            Ok(ReactStep::Final { answer }) => Some(answer),
            Ok(ReactStep::Action { .. }) => None,
            Err(_) => {
                let answer = react::strip_hallucinated_observation(&text).trim();
                (!answer.is_empty()).then(|| answer.to_string())
            }
        }
    }

    /// Drive the reasoning loop; returns the outcome, the steps taken and the tools used
    async fn run_loop(
        &self,
        message: &str,
        history: &[ChatTurn],
        started: Instant,
    ) -> (LoopOutcome, Vec<ScratchStep>, Vec<String>) {
        let system = react::system_prompt(&self.tools);
        let mut steps: Vec<ScratchStep> = Vec::new();
        let mut tools_used: Vec<String> = Vec::new();
        let mut iterations = 0;
        let mut state = LoopState::Thinking;

        loop {
            let remaining = self.max_execution.saturating_sub(started.elapsed());

            state = match state {
                LoopState::Thinking => {
                    if iterations >= self.max_iterations || remaining.is_zero() {
                        info!(
                            "Reasoning loop stopped after {} iterations ({:?} elapsed)",
                            iterations,
                            started.elapsed()
                        );
                        if steps.is_empty() && remaining.is_zero() {
                            LoopState::Done(LoopOutcome::Failed)
                        } else {
                            LoopState::Done(LoopOutcome::Exhausted)
                        }
                    } else {
                        iterations += 1;
                        let prompt = react::user_prompt(message, &steps);
                        match timeout(remaining, self.provider.generate(&system, &prompt, history)).await {
                            Err(_) => {
                                warn!("Generation timed out in iteration {}", iterations);
                                if steps.is_empty() {
                                    LoopState::Done(LoopOutcome::Failed)
                                } else {
                                    LoopState::Done(LoopOutcome::Exhausted)
                                }
                            }
                            Ok(Err(e)) => {
                                warn!("Generation failed in iteration {}: {}", iterations, e);
                                if steps.is_empty() {
                                    LoopState::Done(LoopOutcome::Failed)
                                } else {
                                    LoopState::Done(LoopOutcome::Exhausted)
                                }
                            }
                            Ok(Ok(text)) => match react::parse_step(&text) {
                                Ok(ReactStep::Final { answer }) => {
                                    LoopState::Done(LoopOutcome::Answer(answer))
                                }
                                Ok(ReactStep::Action { tool, input }) => LoopState::ToolCall {
                                    log: react::strip_hallucinated_observation(&text).to_string(),
                                    tool,
                                    input,
                                },
                                Err(e) => {
                                    debug!("Unparseable step: {}", e);
                                    LoopState::Observing {
                                        log: react::strip_hallucinated_observation(&text).to_string(),
                                        observation: format!("{}（{}）", FORMAT_REMINDER, e),
                                    }
                                }
                            },
                        }
                    }
                }
                LoopState::ToolCall { log, tool, input } => {
                    let observation = match self.find_tool(&tool) {
                        Some(found) => {
                            info!("Calling tool {} with {:?}", tool, input);
                            if !tools_used.contains(&tool) {
                                tools_used.push(tool.clone());
                            }
                            self.run_tool(found, &input, remaining).await
                        }
                        None => format!(
                            "工具 {} 不存在，可用工具：{}",
                            tool,
                            self.tool_names().join(", ")
                        ),
                    };
                    LoopState::Observing { log, observation }
                }
                LoopState::Observing { log, observation } => {
                    steps.push(ScratchStep { log, observation });
                    LoopState::Thinking
                }
                LoopState::Done(outcome) => return (outcome, steps, tools_used),
            };
        }
    }
}

/// Answer source for a set of used tools, strongest evidence first
pub fn answer_source_for(tools_used: &[String]) -> &'static str {
    let used = |name: &str| tools_used.iter().any(|t| t == name);
    if used("knowledge_base") {
        sources::KNOWLEDGE_BASE
    } else if used("web_search") {
        sources::WEB_SEARCH
    } else if used("wikipedia") {
        sources::WIKIPEDIA
    } else if !tools_used.is_empty() {
        sources::TOOL
    } else {
        sources::GENERAL_AI
    }
}

/// 0.9 with the knowledge base, 0.8 with any other tool, 0.5 without tools
pub fn confidence_for(tools_used: &[String]) -> f32 {
    if tools_used.iter().any(|t| t == "knowledge_base") {
        0.9
    } else if !tools_used.is_empty() {
        0.8
    } else {
        0.5
    }
}

#[async_trait]
impl SpecializedAgent for GeneralAgent {
    fn name(&self) -> &str {
        "通用助手"
    }

    fn description(&self) -> &str {
        "处理知识库查询、计算、百科等通用问题"
    }

    fn tools(&self) -> Vec<String> {
        self.tool_names()
    }

    async fn can_handle(&self, _message: &str) -> Result<(bool, f32)> {
        Ok((true, 0.5))
    }

    async fn chat(&self, message: &str, history: &[ChatTurn]) -> AgentReply {
        let started = Instant::now();
        let (outcome, steps, tools_used) = self.run_loop(message, history, started).await;

        let answer = match outcome {
            LoopOutcome::Answer(answer) => answer,
            LoopOutcome::Failed => {
                return AgentReply::new(messages::AGENT_APOLOGY, sources::ERROR, 0.0);
            }
            LoopOutcome::Exhausted => {
                let remaining = self.max_execution.saturating_sub(started.elapsed());
                let partial = match self.forced_answer(message, &steps, history, remaining).await {
                    Some(answer) => Some(answer),
                    None => steps
                        .iter()
                        .rev()
                        .map(|s| s.observation.as_str())
                        .find(|o| !o.starts_with(FORMAT_REMINDER))
                        .map(|o| format!("根据目前获取的信息：\n{}", o)),
                };
                match partial {
                    Some(answer) => answer,
                    None => {
                        info!("General agent gathered nothing usable in {:?}", started.elapsed());
                        return AgentReply::new(NO_ANSWER, sources::ERROR, 0.0).with_tools(tools_used);
                    }
                }
            }
        };

        info!(
            "General agent answered in {:?} using tools {:?}",
            started.elapsed(),
            tools_used
        );
        AgentReply::new(
            answer,
            answer_source_for(&tools_used),
            confidence_for(&tools_used),
        )
        .with_tools(tools_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lemo_common::LemoError;
    use lemo_tools::{DateTimeTool, MathTool};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outputs; repeats the last one once the script runs out
    struct ScriptedModel {
        script: Mutex<VecDeque<Option<&'static str>>>,
        last: Mutex<Option<&'static str>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(script: Vec<Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedModel {
        async fn generate(&self, _system: &str, _user: &str, _history: &[ChatTurn]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let output = match next {
                Some(output) => {
                    *self.last.lock().unwrap() = output;
                    output
                }
                None => *self.last.lock().unwrap(),
            };
            output
                .map(str::to_string)
                .ok_or_else(|| LemoError::Generation("model offline".to_string()))
        }

        async fn classify(&self, _prompt: &str) -> Result<String> {
            Ok("其他".to_string())
        }
    }

    fn agent(model: Arc<ScriptedModel>) -> GeneralAgent {
        let tools: Vec<Box<dyn AiTool>> = vec![Box::new(MathTool), Box::new(DateTimeTool)];
        GeneralAgent::new(model, tools, &AgentsConfig::default())
    }

    #[tokio::test]
    async fn test_always_bids_half() {
        let agent = agent(ScriptedModel::new(vec![]));
        assert_eq!(agent.can_handle("任何问题").await.unwrap(), (true, 0.5));
    }

    #[tokio::test]
    async fn test_direct_answer_without_tools() {
        let model = ScriptedModel::new(vec![Some("Thought: 简单问候\nFinal Answer: 你好！")]);
        let reply = agent(model).chat("你好", &[]).await;

        assert_eq!(reply.answer, "你好！");
        assert_eq!(reply.answer_source, "general_ai");
        assert!((reply.confidence - 0.5).abs() < 1e-6);
        assert!(reply.tools_used.is_empty());
    }

    #[tokio::test]
    async fn test_tool_step_then_answer() {
        let model = ScriptedModel::new(vec![
            Some("Thought: 需要计算\nAction: calculator\nAction Input: 2+3*4"),
            Some("Thought: 我现在可以回答了\nFinal Answer: 结果是14"),
        ]);
        let reply = agent(model.clone()).chat("2+3*4等于多少", &[]).await;

        assert_eq!(reply.answer, "结果是14");
        assert_eq!(reply.tools_used, ["calculator"]);
        assert_eq!(reply.answer_source, "tool");
        assert!((reply.confidence - 0.8).abs() < 1e-6);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parse_errors_are_fed_back() {
        let model = ScriptedModel::new(vec![
            Some("我不知道该怎么办"),
            Some("Final Answer: 好的"),
        ]);
        let reply = agent(model.clone()).chat("随便聊聊", &[]).await;

        assert_eq!(reply.answer, "好的");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observation() {
        let model = ScriptedModel::new(vec![
            Some("Action: teleport\nAction Input: 火星"),
            Some("Final Answer: 做不到"),
        ]);
        let reply = agent(model).chat("带我去火星", &[]).await;

        assert_eq!(reply.answer, "做不到");
        assert!(reply.tools_used.is_empty());
    }

    #[tokio::test]
    async fn test_iteration_bound_still_answers() {
        let model = ScriptedModel::new(vec![Some(
            "Thought: 再算一次\nAction: calculator\nAction Input: 1+1",
        )]);
        let reply = agent(model.clone()).chat("1+1", &[]).await;

        assert!(!reply.answer.trim().is_empty());
        assert!(reply.answer.contains("2"));
        assert_eq!(reply.answer_source, "tool");
        // five loop iterations plus one forced final attempt
        assert_eq!(model.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_generation_failure_before_observation_is_error() {
        let reply = agent(ScriptedModel::new(vec![None])).chat("你好", &[]).await;

        assert_eq!(reply.answer_source, "error");
        assert_eq!(reply.confidence, 0.0);
        assert!(!reply.answer.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_after_observation_keeps_partial() {
        let model = ScriptedModel::new(vec![
            Some("Action: calculator\nAction Input: 6*7"),
            None,
        ]);
        let reply = agent(model).chat("6*7", &[]).await;

        assert!(reply.answer.contains("42"));
        assert_eq!(reply.answer_source, "tool");
    }

    #[tokio::test]
    async fn test_zero_budget_is_error() {
        let model = ScriptedModel::new(vec![Some("Final Answer: 不会用到")]);
        let reply = agent(model.clone())
            .with_max_execution(Duration::ZERO)
            .chat("你好", &[])
            .await;

        assert_eq!(reply.answer, messages::AGENT_APOLOGY);
        assert_eq!(reply.answer_source, "error");
        assert_eq!(reply.confidence, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_nothing_usable_is_degraded() {
        let mut script = vec![Some("我也不确定"); 5];
        script.push(None);
        let model = ScriptedModel::new(script);
        let reply = agent(model.clone()).chat("随便聊聊", &[]).await;

        assert_eq!(reply.answer, NO_ANSWER);
        assert_eq!(reply.answer_source, "error");
        assert_eq!(reply.confidence, 0.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 6);
    }

    /// Answers the first call, then never resolves
    struct StallingModel {
        first: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationProvider for StallingModel {
        async fn generate(&self, _system: &str, _user: &str, _history: &[ChatTurn]) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(output) = self.first {
                    return Ok(output.to_string());
                }
            }
            std::future::pending::<Result<String>>().await
        }

        async fn classify(&self, _prompt: &str) -> Result<String> {
            Ok("其他".to_string())
        }
    }

    fn stalling_agent(first: Option<&'static str>) -> (GeneralAgent, Arc<StallingModel>) {
        let model = Arc::new(StallingModel {
            first,
            calls: AtomicUsize::new(0),
        });
        let tools: Vec<Box<dyn AiTool>> = vec![Box::new(MathTool)];
        let agent = GeneralAgent::new(model.clone(), tools, &AgentsConfig::default());
        (agent, model)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_model_before_any_step_is_error() {
        let (agent, model) = stalling_agent(None);
        let reply = agent.chat("你好", &[]).await;

        assert_eq!(reply.answer_source, "error");
        assert_eq!(reply.confidence, 0.0);
        assert!(!reply.answer.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_expiring_mid_loop_keeps_observation() {
        let (agent, model) = stalling_agent(Some("Action: calculator\nAction Input: 6*7"));
        let started = Instant::now();
        let reply = agent.chat("6*7", &[]).await;

        assert!(reply.answer.contains("42"));
        assert_eq!(reply.answer_source, "tool");
        assert!((reply.confidence - 0.8).abs() < 1e-6);
        assert_eq!(reply.tools_used, ["calculator"]);
        // no forced final attempt once the budget is spent
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[test]
    fn test_source_priority() {
        let tools = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(answer_source_for(&tools(&["calculator", "knowledge_base"])), "knowledge_base");
        assert_eq!(answer_source_for(&tools(&["wikipedia", "web_search"])), "web_search");
        assert_eq!(answer_source_for(&tools(&["datetime", "wikipedia"])), "wikipedia");
        assert_eq!(answer_source_for(&tools(&["datetime"])), "tool");
        assert_eq!(answer_source_for(&[]), "general_ai");
        assert!((confidence_for(&tools(&["knowledge_base"])) - 0.9).abs() < 1e-6);
    }
}
