//! Prompt templates for answer generation

/// How an answer is grounded, chosen from the confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerStrategy {
    /// Answer only from knowledge base context
    Strict,
    /// Context offered, model may blend in general knowledge
    Blended,
    /// Answer from web search results
    Web,
    /// No context at all
    General,
}

const STRICT_SYSTEM_PROMPT: &str = "你是一个专业的智能客服助手。请严格根据提供的知识库内容回答用户问题。

规则：
1. 只使用知识库中的信息回答，不要编造内容
2. 回答要准确、专业、友好
3. 如果知识库内容不足以回答，礼貌地告知用户并建议联系人工客服
4. 保持回答简洁明了";

const BLENDED_SYSTEM_PROMPT: &str = "你是一个专业的智能客服助手。下面提供了一些可能相关的知识库内容。

规则：
1. 如果知识库内容与问题相关，优先参考它
2. 如果知识库内容不相关或不完整，可以结合你的通用知识回答
3. 回答要准确、专业、友好
4. 保持回答简洁明了";

const WEB_SYSTEM_PROMPT: &str = "你是一个智能助手。下面提供了网络搜索结果。

规则：
1. 根据搜索结果回答用户问题，并在合适时注明信息来源
2. 搜索结果可能不准确或已过时，不确定时请说明
3. 使用中文回答，保持简洁明了";

const GENERAL_SYSTEM_PROMPT: &str = "你是一个友好的智能助手。请用你的通用知识回答用户问题。

规则：
1. 回答要准确、友好，不确定时如实说明
2. 涉及公司业务的具体问题，建议用户联系人工客服
3. 使用中文回答，保持简洁明了";

impl AnswerStrategy {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            AnswerStrategy::Strict => STRICT_SYSTEM_PROMPT,
            AnswerStrategy::Blended => BLENDED_SYSTEM_PROMPT,
            AnswerStrategy::Web => WEB_SYSTEM_PROMPT,
            AnswerStrategy::General => GENERAL_SYSTEM_PROMPT,
        }
    }

    /// User prompt carrying the question and, when the strategy uses one, the context
    pub fn user_prompt(&self, question: &str, context: &str) -> String {
        match self {
            AnswerStrategy::Strict => format!(
                "知识库内容：\n{}\n\n用户问题：{}\n\n请只根据知识库内容回答用户问题。",
                context, question
            ),
            AnswerStrategy::Blended => format!(
                "参考资料（可能相关）：\n{}\n\n用户问题：{}\n\n请结合参考资料和你的知识回答用户问题。",
                context, question
            ),
            AnswerStrategy::Web => format!(
                "网络搜索结果：\n{}\n\n用户问题：{}\n\n请根据搜索结果回答用户问题。",
                context, question
            ),
            AnswerStrategy::General => question.to_string(),
        }
    }
}

/// Prompt asking the model for exactly one intent label
pub fn intent_prompt(question: &str, labels: &[&str]) -> String {
    let categories = labels
        .iter()
        .map(|label| format!("- {}", label))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "请判断以下用户问题属于哪个类别，只返回类别名称，不要其他内容：\n\n类别：\n{}\n\n用户问题：{}\n\n类别：",
        categories, question
    )
}
