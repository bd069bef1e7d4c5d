//! Text protocol for the tool-using reasoning loop
//!
//! The model is prompted to answer in the form
//!
//! ```text
//! Thought: ...
//! Action: <tool name>
//! Action Input: <input>
//! ```
//!
//! or to finish with `Final Answer: ...`. Each completed step is replayed to
//! the model with the tool's `Observation:` appended.

use lemo_tools::AiTool;
use serde_json::Value;

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";

/// Observation fed back when the model output cannot be parsed
pub const FORMAT_REMINDER: &str = "格式错误：请严格按照 Thought / Action / Action Input 的格式选择工具，或使用 Final Answer 给出最终回答。";

/// One parsed model turn
#[derive(Debug, Clone, PartialEq)]
pub enum ReactStep {
    Action { tool: String, input: String },
    Final { answer: String },
}

/// A model turn that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A completed tool step, replayed to the model on the next turn
#[derive(Debug, Clone)]
pub struct ScratchStep {
    pub log: String,
    pub observation: String,
}

/// Drop anything the model wrote after inventing its own observation
pub fn strip_hallucinated_observation(text: &str) -> &str {
    match text.find(OBSERVATION) {
        Some(idx) => text[..idx].trim_end(),
        None => text.trim_end(),
    }
}

fn after<'a>(text: &'a str, marker: &str) -> Option<(usize, &'a str)> {
    text.find(marker).map(|idx| (idx, &text[idx + marker.len()..]))
}

fn clean_input(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

/// Parse one model turn
pub fn parse_step(text: &str) -> Result<ReactStep, ParseError> {
    let text = strip_hallucinated_observation(text);
    let action = after(text, ACTION);
    let final_answer = after(text, FINAL_ANSWER);

    match (action, final_answer) {
        (Some((action_idx, _)), Some((final_idx, answer))) if final_idx < action_idx => {
            final_step(answer)
        }
        (Some((_, rest)), _) => {
            let (tool_line, remainder) = rest.split_once('\n').unwrap_or((rest, ""));
            let tool = tool_line.trim().trim_matches(|c: char| c == '"' || c == '`').to_string();
            if tool.is_empty() {
                return Err(ParseError("缺少工具名称（Action 为空）".to_string()));
            }

            let input = match after(remainder, ACTION_INPUT) {
                Some((_, input)) => {
                    let input = input.split(FINAL_ANSWER).next().unwrap_or(input);
                    clean_input(input)
                }
                None => {
                    return Err(ParseError(format!(
                        "缺少 'Action Input:'（工具 {}）",
                        tool
                    )));
                }
            };

            Ok(ReactStep::Action { tool, input })
        }
        (None, Some((_, answer))) => final_step(answer),
        (None, None) => Err(ParseError(
            "无法解析输出：缺少 'Action:' 或 'Final Answer:'".to_string(),
        )),
    }
}

fn final_step(answer: &str) -> Result<ReactStep, ParseError> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(ParseError("Final Answer 为空".to_string()));
    }
    Ok(ReactStep::Final {
        answer: answer.to_string(),
    })
}

/// Turn free-text tool input into tool parameters
///
/// A JSON object is passed through; anything else becomes the tool's primary parameter.
pub fn tool_params(tool: &dyn AiTool, input: &str) -> Value {
    match serde_json::from_str::<Value>(input) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ tool.primary_param(): input }),
    }
}

/// System prompt listing the available tools and the required format
pub fn system_prompt(tools: &[Box<dyn AiTool>]) -> String {
    let descriptions = tools
        .iter()
        .map(|t| format!("{}: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let names = tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ");

    format!(
        "你是一个智能助手，可以使用工具来帮助用户。

可用工具：
{descriptions}

工具名称：{names}

重要规则：
1. 公司业务问题 → 优先使用 knowledge_base
2. 日期时间问题 → 使用 datetime
3. 数学计算 → 使用 calculator
4. 百科知识 → 使用 wikipedia
5. 实时信息、新闻 → 使用 web_search
6. 如果工具返回错误或无结果，直接告知用户，不要重复尝试
7. 最多使用2个工具，然后必须给出最终回答

格式（严格遵守）：
Question: 用户问题
Thought: 我需要使用什么工具
Action: 工具名
Action Input: 工具参数
Observation: 工具结果
Thought: 我现在可以回答了
Final Answer: 中文回答"
    )
}

/// The question followed by every completed step
pub fn user_prompt(question: &str, steps: &[ScratchStep]) -> String {
    let mut prompt = format!("Question: {}\nThought:", question);
    for step in steps {
        prompt.push(' ');
        prompt.push_str(step.log.trim_start_matches("Thought:").trim());
        prompt.push_str(&format!("\n{} {}\nThought:", OBSERVATION, step.observation));
    }
    prompt
}

/// Prompt suffix asking for a final answer once the loop is out of budget
pub fn final_answer_request(question: &str, steps: &[ScratchStep]) -> String {
    format!(
        "{} 我已经无法继续使用工具，现在必须根据以上信息直接给出最终回答。\n{}",
        user_prompt(question, steps),
        FINAL_ANSWER
    )
}
