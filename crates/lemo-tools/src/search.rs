//! Web search providers and the search tool
//!
//! Two backends are available: a SearXNG instance queried through its JSON
//! API, and DuckDuckGo's HTML endpoint scraped with `scraper`.

use crate::base::{AiTool, required_str};
use anyhow::Error;
use async_trait::async_trait;
use lemo_common::{LemoError, Result, SearchConfig, SearchProviderKind, truncate_chars};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single web search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Backend that turns a query into search hits
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Run a search, treating any provider failure as "no results"
pub async fn search_or_empty(
    provider: &dyn WebSearchProvider,
    query: &str,
    max_results: usize,
) -> Vec<SearchResult> {
    match provider.search(query, max_results).await {
        Ok(results) => {
            info!("Web search for {:?} returned {} results", query, results.len());
            results
        }
        Err(e) => {
            warn!("Web search failed: {}", e);
            Vec::new()
        }
    }
}

/// Render search hits as a numbered context block
pub fn format_search_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[搜索结果{}]\n标题：{}\n来源：{}\n摘要：{}",
                i + 1,
                r.title,
                r.url,
                r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn http_client(timeout_seconds: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| LemoError::Search(format!("Failed to build HTTP client: {}", e)))
}

/// SearXNG metasearch over its JSON API
pub struct SearxngSearch {
    client: Client,
    base_url: String,
    language: String,
    snippet_chars: usize,
}

impl SearxngSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            base_url: config.searxng_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            snippet_chars: config.snippet_chars,
        })
    }
}

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngHit>,
}

#[derive(Deserialize)]
struct SearxngHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

fn parse_searxng_results(
    body: &str,
    max_results: usize,
    snippet_chars: usize,
) -> Result<Vec<SearchResult>> {
    let response: SearxngResponse = serde_json::from_str(body)?;
    Ok(response
        .results
        .into_iter()
        .take(max_results)
        .map(|hit| SearchResult {
            title: hit.title,
            url: hit.url,
            snippet: truncate_chars(&hit.content, snippet_chars),
        })
        .collect())
}

#[async_trait]
impl WebSearchProvider for SearxngSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!("SearXNG search: {:?}", query);

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("language", self.language.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LemoError::Search(format!("SearXNG request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LemoError::Search(format!(
                "SearXNG returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LemoError::Search(format!("SearXNG body error: {}", e)))?;
        parse_searxng_results(&body, max_results, self.snippet_chars)
    }
}

/// DuckDuckGo search through the HTML endpoint
pub struct DuckDuckGoSearch {
    client: Client,
    snippet_chars: usize,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            snippet_chars: config.snippet_chars,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| LemoError::Search(format!("Invalid selector {}: {:?}", css, e)))
}

fn parse_ddg_html(body: &str, max_results: usize, snippet_chars: usize) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(body);

    let result_selector = selector(".web-result")?;
    let result_title_selector = selector(".result__a")?;
    let result_url_selector = selector(".result__url")?;
    let result_snippet_selector = selector(".result__snippet")?;

    let text_of = |element: scraper::ElementRef<'_>, selector: &Selector| {
        element
            .select(selector)
            .next()
            .map(|n| n.text().collect::<Vec<_>>().join("").trim().to_string())
            .unwrap_or_default()
    };

    Ok(document
        .select(&result_selector)
        .filter_map(|result| {
            let title = text_of(result, &result_title_selector);
            let url = text_of(result, &result_url_selector);
            let snippet = text_of(result, &result_snippet_selector);

            if !title.is_empty() && !url.is_empty() {
                Some(SearchResult {
                    title,
                    url,
                    snippet: truncate_chars(&snippet, snippet_chars),
                })
            } else {
                None
            }
        })
        .take(max_results)
        .collect())
}

#[async_trait]
impl WebSearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!("DuckDuckGo search: {:?}", query);

        let resp = self
            .client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query)])
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("User-Agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:140.0) Gecko/20100101 Firefox/140.0")
            .header("Accept-Language", "zh-CN,zh;q=0.8,en-US;q=0.5")
            .send()
            .await
            .map_err(|e| LemoError::Search(format!("Request error: {}", e)))?;

        debug!("Response status: {}", resp.status());
        if !resp.status().is_success() {
            return Err(LemoError::Search(format!(
                "DuckDuckGo returned HTTP {}",
                resp.status()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| LemoError::Search(format!("Body error: {}", e)))?;

        if body.contains("captcha") {
            debug!("Response may indicate blocking: contains 'captcha'");
        }

        parse_ddg_html(&body, max_results, self.snippet_chars)
    }
}

/// Build the configured search backend
pub fn create_search_provider(config: &SearchConfig) -> Result<Arc<dyn WebSearchProvider>> {
    Ok(match config.provider {
        SearchProviderKind::Searxng => Arc::new(SearxngSearch::new(config)?),
        SearchProviderKind::DuckDuckGo => Arc::new(DuckDuckGoSearch::new(config)?),
    })
}

/// Tool exposing web search to agents
pub struct WebSearchTool {
    provider: Arc<dyn WebSearchProvider>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn WebSearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results,
        }
    }
}

#[async_trait]
impl AiTool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "在互联网上搜索最新信息。适用于：实时新闻、最新事件等需要网络查询的问题。输入：搜索关键词"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> std::result::Result<Value, Error> {
        let query = required_str(&params, "query")?;
        let results = search_or_empty(self.provider.as_ref(), query, self.max_results).await;

        if results.is_empty() {
            return Ok(Value::String("未找到搜索结果。".to_string()));
        }
        Ok(Value::String(format_search_context(&results)))
    }
}
