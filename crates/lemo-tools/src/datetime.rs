//! Current date and time lookup

use crate::base::AiTool;
use anyhow::Error;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, TimeZone, Weekday};
use serde_json::Value;

/// Tool that reports the current local date, time and weekday
pub struct DateTimeTool;

/// Chinese weekday name
pub fn weekday_zh(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
        Weekday::Sun => "星期日",
    }
}

pub fn describe_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "当前时间信息：\n日期：{}\n时间：{}\n星期：{}",
        now.format("%Y年%m月%d日"),
        now.format("%H:%M:%S"),
        weekday_zh(now.weekday())
    )
}

#[async_trait]
impl AiTool for DateTimeTool {
    fn name(&self) -> &str {
        "datetime"
    }

    fn description(&self) -> &str {
        "获取当前日期、时间、星期等信息。适用于：查询今天日期、现在几点、星期几等问题。输入：日期时间相关的问题"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The date or time question"
                }
            }
        })
    }

    async fn execute(&self, _params: Value) -> Result<Value, Error> {
        Ok(Value::String(describe_datetime(&Local::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_describe_datetime() {
        let moment = Utc.with_ymd_and_hms(2024, 3, 15, 9, 5, 7).unwrap();
        let text = describe_datetime(&moment);
        assert!(text.contains("日期：2024年03月15日"));
        assert!(text.contains("时间：09:05:07"));
        assert!(text.contains("星期：星期五"));
    }

    #[tokio::test]
    async fn test_tool_ignores_params() {
        let result = DateTimeTool.execute(json!({"query": "今天几号"})).await.unwrap();
        assert!(result.as_str().unwrap().starts_with("当前时间信息"));
        assert!(DateTimeTool.execute(json!({})).await.is_ok());
    }
}
