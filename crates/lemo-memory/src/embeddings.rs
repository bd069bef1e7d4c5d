//! Embedding generation for questions and knowledge entries
//!
//! Every service hands back unit-length vectors: the vector index scores by
//! inner product, which only behaves like cosine similarity on normalised input.

use async_trait::async_trait;
use lemo_common::{EmbeddingConfig, EmbeddingProviderKind, LemoError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A trait for embedding services that can generate vector representations
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate a unit-normalised embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the dimensions of embeddings produced by this service
    fn dimensions(&self) -> usize;

    /// Get the maximum text length this service can handle
    fn max_text_length(&self) -> usize;
}

/// Scale a vector to unit L2 norm
pub fn normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return Err(LemoError::Embedding(
            "Cannot normalise a zero or non-finite vector".to_string(),
        ));
    }
    for value in &mut vector {
        *value /= magnitude;
    }
    Ok(vector)
}

/// Inner product of two equal-length vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(LemoError::Index(format!(
            "Vector dimensions don't match: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

fn truncate_input(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        warn!("Truncating text to {} characters before embedding", max_len);
        lemo_common::truncate_chars(text, max_len)
    } else {
        text.to_string()
    }
}

fn check_dimensions(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(LemoError::Embedding(format!(
            "Expected {} dimensions, provider returned {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| LemoError::Embedding(format!("Failed to build HTTP client: {}", e)))
}

/// Ollama embedding service (`POST /api/embeddings`)
pub struct OllamaEmbeddingService {
    config: EmbeddingConfig,
    client: reqwest::Client,
    base_url: String,
}

impl OllamaEmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string())
            .trim_end_matches('/')
            .to_string();
        let client = http_client(config.timeout_seconds)?;
        Ok(Self {
            config,
            client,
            base_url,
        })
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            prompt: String,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            prompt: truncate_input(text, self.config.max_text_length),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| LemoError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LemoError::Embedding(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LemoError::Embedding(format!("Invalid Ollama response: {}", e)))?;

        check_dimensions(&body.embedding, self.config.dimensions)?;
        debug!("Generated embedding using Ollama model {}", self.config.model);
        normalize(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn max_text_length(&self) -> usize {
        self.config.max_text_length
    }
}

/// OpenAI embedding service implementation
pub struct OpenAIEmbeddingService {
    config: EmbeddingConfig,
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIEmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LemoError::Config("OpenAI API key is required".to_string()))?;
        let client = http_client(config.timeout_seconds)?;
        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }
}

#[async_trait]
impl EmbeddingService for OpenAIEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let embeddings = self.embed_texts(&texts).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LemoError::Embedding("No embedding returned from OpenAI".to_string()))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct EmbeddingRequest {
            input: Vec<String>,
            model: String,
            encoding_format: String,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest {
            input: texts
                .iter()
                .map(|text| truncate_input(text, self.config.max_text_length))
                .collect(),
            model: self.config.model.clone(),
            encoding_format: "float".to_string(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LemoError::Embedding(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LemoError::Embedding(format!("OpenAI API error: {}", error_text)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LemoError::Embedding(format!("Invalid OpenAI response: {}", e)))?;

        debug!("Generated {} embeddings using OpenAI", body.data.len());
        body.data
            .into_iter()
            .map(|data| {
                check_dimensions(&data.embedding, self.config.dimensions)?;
                normalize(data.embedding)
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn max_text_length(&self) -> usize {
        self.config.max_text_length
    }
}

/// Deterministic embeddings from hashed character unigrams and bigrams.
///
/// Texts sharing characters land near each other, which is enough to exercise
/// the retrieval path without a model server.
pub struct MockEmbeddingService {
    config: EmbeddingConfig,
}

impl MockEmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let hash = lemo_common::string_hash(feature);
        let index = (hash as usize) % self.config.dimensions;
        let sign = if (hash >> 31) & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

#[async_trait]
impl EmbeddingService for MockEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if self.config.dimensions == 0 {
            return Err(LemoError::Config("Embedding dimensions must be positive".to_string()));
        }

        let text = truncate_input(text.trim(), self.config.max_text_length).to_lowercase();
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.is_empty() {
            return Err(LemoError::Embedding("Cannot embed empty text".to_string()));
        }

        let mut embedding = vec![0.0f32; self.config.dimensions];
        for c in &chars {
            let (index, sign) = self.bucket(&c.to_string());
            embedding[index] += sign;
        }
        for pair in chars.windows(2) {
            let feature: String = pair.iter().collect();
            let (index, sign) = self.bucket(&feature);
            embedding[index] += 2.0 * sign;
        }

        // Bucket collisions can cancel out; fall back to a single hashed slot
        if embedding.iter().all(|v| *v == 0.0) {
            let (index, _) = self.bucket(&text);
            embedding[index] = 1.0;
        }

        normalize(embedding)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn max_text_length(&self) -> usize {
        self.config.max_text_length
    }
}

/// Factory for creating embedding services
pub struct EmbeddingServiceFactory;

impl EmbeddingServiceFactory {
    pub fn create(config: EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
        let service: Arc<dyn EmbeddingService> = match config.provider {
            EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbeddingService::new(config)?),
            EmbeddingProviderKind::OpenAI => Arc::new(OpenAIEmbeddingService::new(config)?),
            EmbeddingProviderKind::Mock => Arc::new(MockEmbeddingService::new(config)),
        };
        Ok(service)
    }
}
