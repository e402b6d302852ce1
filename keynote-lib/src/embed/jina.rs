//! Jina AI embeddings client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EMBEDDING_DIMENSION;
use crate::embed::{Embedding, EmbeddingProvider};
use crate::{Error, Result};

/// Connection and model settings for [`JinaEmbedder`].
#[derive(Debug, Clone)]
pub struct JinaConfig {
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for JinaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jina.ai/v1".to_string(),
            model: "jina-embeddings-v3".to_string(),
            dimensions: EMBEDDING_DIMENSION,
            batch_size: 50,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Async client for Jina's OpenAI-style `/embeddings` endpoint.
///
/// Passages and queries use the `retrieval.passage` / `retrieval.query`
/// task adapters. Rate limits, server errors, timeouts and connection
/// failures are reported as transient so callers can retry them.
#[derive(Clone)]
pub struct JinaEmbedder {
    client: Client,
    endpoint: String,
    config: JinaConfig,
}

impl JinaEmbedder {
    pub fn new(api_key: &str, config: JinaConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Configuration("missing Jina API key".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(Error::Configuration("missing Jina model name".to_string()));
        }
        if config.dimensions == 0 || config.batch_size == 0 {
            return Err(Error::Configuration(
                "Jina dimensions and batch size must be positive".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| Error::Configuration("invalid Jina API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/embeddings", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn request(&self, task: &str, input: &[&str]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            task,
            dimensions: self.config.dimensions,
            late_chunking: false,
            embedding_type: "float",
            input,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("Jina embeddings request failed ({status}): {body}");
            return Err(Error::Embedding {
                message,
                transient: should_retry(status),
            });
        }

        let body = response.bytes().await?;
        let vectors = parse_embeddings(&body)?;
        debug!(task, inputs = input.len(), "embedded batch");
        Ok(vectors)
    }
}

/// Decode a response body into vectors ordered by their input position.
fn parse_embeddings(body: &[u8]) -> Result<Vec<Embedding>> {
    let mut parsed: EmbeddingResponse = serde_json::from_slice(body)
        .map_err(|e| Error::embedding(format!("failed to parse Jina response: {e}")))?;
    parsed.data.sort_by_key(|entry| entry.index);
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl EmbeddingProvider for JinaEmbedder {
    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.config.batch_size {
            return Err(Error::embedding(format!(
                "batch of {} exceeds configured max {}",
                texts.len(),
                self.config.batch_size
            )));
        }
        let input: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.request("retrieval.passage", &input).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.request("retrieval.query", &[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("Jina returned no embedding for query"))
    }

    fn dimension(&self) -> usize {
        self.config.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    task: &'a str,
    dimensions: usize,
    late_chunking: bool,
    embedding_type: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let err = JinaEmbedder::new("  ", JinaConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_endpoint_and_defaults() {
        let config = JinaConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..JinaConfig::default()
        };
        let embedder = JinaEmbedder::new("key", config).unwrap();

        assert_eq!(embedder.endpoint, "http://localhost:9000/v1/embeddings");
        assert_eq!(embedder.dimension(), 1024);
        assert_eq!(embedder.max_batch_size(), 50);
        assert_eq!(embedder.model_name(), "jina-embeddings-v3");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(!should_retry(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_request_body_shape() {
        let input = ["a", "b"];
        let request = EmbeddingRequest {
            model: "jina-embeddings-v3",
            task: "retrieval.passage",
            dimensions: 1024,
            late_chunking: false,
            embedding_type: "float",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["task"], "retrieval.passage");
        assert_eq!(json["input"][1], "b");
        assert_eq!(json["dimensions"], 1024);
    }

    #[test]
    fn test_response_sorted_by_index() {
        let body = br#"{"model": "jina-embeddings-v3", "data": [
            {"index": 2, "embedding": [0.0, 0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0, 0.0]},
            {"index": 1, "embedding": [0.0, 1.0, 0.0]}
        ]}"#;
        let vectors = parse_embeddings(body).unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(vectors[2], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_malformed_response_is_permanent() {
        let err = parse_embeddings(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::Embedding { transient: false, .. }));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_before_request() {
        let config = JinaConfig {
            batch_size: 2,
            ..JinaConfig::default()
        };
        let embedder = JinaEmbedder::new("key", config).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = embedder.embed_passages(&texts).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
