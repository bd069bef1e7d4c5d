//! Intent classification over a fixed label set

use crate::prompts::intent_prompt;
use crate::provider::GenerationProvider;
use lemo_common::messages::UNKNOWN_INTENT;
use tracing::{debug, warn};

/// Labels the classifier may return
pub const INTENT_LABELS: [&str; 6] = ["产品咨询", "售后服务", "订单查询", "投诉建议", "闲聊", UNKNOWN_INTENT];

/// Map free model output onto the first label it contains
pub fn parse_intent(raw: &str) -> &'static str {
    let raw = raw.trim();
    INTENT_LABELS
        .iter()
        .find(|label| raw.contains(*label))
        .copied()
        .unwrap_or(UNKNOWN_INTENT)
}

/// Classify a question; failures fall back to the unknown label
pub async fn detect_intent(provider: &dyn GenerationProvider, question: &str) -> String {
    match provider.classify(&intent_prompt(question, &INTENT_LABELS)).await {
        Ok(raw) => {
            let intent = parse_intent(&raw);
            debug!("Intent for {:?}: {} (raw {:?})", question, intent, raw);
            intent.to_string()
        }
        Err(e) => {
            warn!("Intent detection failed: {}", e);
            UNKNOWN_INTENT.to_string()
        }
    }
}
