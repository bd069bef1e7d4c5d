//! Base trait for tools an agent can invoke

use anyhow::Error;
use async_trait::async_trait;
use serde_json::Value;

/// A tool that can be used by an agent
#[async_trait]
pub trait AiTool: Send + Sync {
    /// The name of the tool
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// The JSON schema for the tool's parameters
    fn schema(&self) -> Value;

    /// Execute the tool with the given parameters
    async fn execute(&self, params: Value) -> Result<Value, Error>;

    /// Validate the parameters against the schema
    fn validate_params(&self, _params: &Value) -> Result<(), Error> {
        Ok(())
    }

    /// Name of the single required string parameter, used when a caller only has free text
    fn primary_param(&self) -> &str {
        "query"
    }
}

/// Render a tool result as text an agent can read back
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read a required, non-empty string parameter
pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, Error> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid '{}' parameter", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl AiTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the input text"
        }

        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to echo back"
                    }
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, params: Value) -> Result<Value, Error> {
            Ok(json!(required_str(&params, "text")?))
        }

        fn primary_param(&self) -> &str {
            "text"
        }
    }

    #[tokio::test]
    async fn test_echo_tool() {
        let tool = EchoTool;
        let result = tool.execute(json!({"text": "Hello, world!"})).await.unwrap();
        assert_eq!(result.as_str().unwrap(), "Hello, world!");
        assert!(tool.execute(json!({"text": "  "})).await.is_err());
        assert!(tool.execute(json!({})).await.is_err());
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("已完成")), "已完成");
        assert_eq!(value_to_text(&json!(14.0)), "14.0");
        assert_eq!(value_to_text(&Value::Null), "");
    }
}
