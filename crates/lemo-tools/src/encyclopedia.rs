//! Encyclopedia lookup against the Wikipedia API

use crate::base::{AiTool, required_str};
use anyhow::{Error, anyhow};
use async_trait::async_trait;
use lemo_common::{EncyclopediaConfig, truncate_chars};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// A summarised encyclopedia article
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: String,
    pub summary: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    extract: String,
}

fn parse_articles(body: &str, top_k: usize, max_chars: usize) -> Result<Vec<Article>, Error> {
    let response: QueryResponse = serde_json::from_str(body)?;
    let mut pages = response.query.map(|q| q.pages).unwrap_or_default();
    pages.sort_by_key(|page| page.index);

    Ok(pages
        .into_iter()
        .filter(|page| !page.extract.trim().is_empty())
        .take(top_k)
        .map(|page| Article {
            title: page.title,
            summary: truncate_chars(page.extract.trim(), max_chars),
        })
        .collect())
}

pub fn format_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .map(|a| format!("词条：{}\n摘要：{}", a.title, a.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Wikipedia search returning article introductions
pub struct WikipediaTool {
    client: Client,
    endpoint: String,
    top_k_results: usize,
    max_chars: usize,
}

impl WikipediaTool {
    pub fn new(config: &EncyclopediaConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("lemo/0.1")
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("https://{}.wikipedia.org/w/api.php", config.language),
            top_k_results: config.top_k_results,
            max_chars: config.max_chars,
        })
    }

    pub async fn lookup(&self, query: &str) -> Result<Vec<Article>, Error> {
        let limit = self.top_k_results.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
            ])
            .send()
            .await
            .map_err(|e| anyhow!("Wikipedia request failed: {}", e))?;

        if !resp.status().is_success() {
            return Err(anyhow!("Wikipedia returned HTTP {}", resp.status()));
        }

        let body = resp.text().await?;
        let articles = parse_articles(&body, self.top_k_results, self.max_chars)?;
        debug!("Wikipedia lookup {:?} found {} articles", query, articles.len());
        Ok(articles)
    }
}

#[async_trait]
impl AiTool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "查询维基百科获取百科知识。适用于：历史事件、人物介绍、科学概念、地理信息等百科类问题。输入：查询关键词"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<Value, Error> {
        let query = required_str(&params, "query")?;
        let articles = self.lookup(query).await?;

        if articles.is_empty() {
            return Ok(Value::String("维基百科中未找到相关词条。".to_string()));
        }
        Ok(Value::String(format_articles(&articles)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_articles_orders_and_truncates() {
        let body = json!({
            "batchcomplete": true,
            "query": {
                "pages": [
                    {"pageid": 2, "title": "长城", "index": 2, "extract": "长城是古代军事工程。"},
                    {"pageid": 1, "title": "万里长城", "index": 1, "extract": "万里长城位于中国北方，全长两万多公里。"},
                    {"pageid": 3, "title": "空", "index": 3, "extract": ""}
                ]
            }
        })
        .to_string();

        let articles = parse_articles(&body, 2, 6).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "万里长城");
        assert_eq!(articles[0].summary, "万里长城位于");
        assert_eq!(articles[1].title, "长城");
    }

    #[test]
    fn test_parse_articles_without_results() {
        assert!(parse_articles(r#"{"batchcomplete": true}"#, 2, 500).unwrap().is_empty());
    }

    #[test]
    fn test_format_articles() {
        let text = format_articles(&[Article {
            title: "长城".to_string(),
            summary: "古代军事工程".to_string(),
        }]);
        assert_eq!(text, "词条：长城\n摘要：古代军事工程");
    }

    #[tokio::test]
    async fn test_requires_query() {
        let tool = WikipediaTool::new(&EncyclopediaConfig::default()).unwrap();
        assert_eq!(tool.name(), "wikipedia");
        assert!(tool.execute(json!({})).await.is_err());
    }
}
