//! Client for an OpenAI-compatible embedding service.

use std::time::Duration;

use async_trait::async_trait;
use hebelki_core::{HebelkiError, HebelkiResult};

use crate::embedding::{EmbeddingConfig, EmbeddingProvider};

/// Embedding provider backed by `POST {base_url}/v1/embeddings`.
///
/// Works with OpenAI, Ollama, vLLM and any other server exposing the
/// OpenAI embeddings API. Every failure maps to
/// [`HebelkiError::EmbeddingUnavailable`]; retries belong to the service.
pub struct HttpEmbedding {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbedding {
    /// Create a client for the model described by `config`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> HebelkiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HebelkiError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            dimension: config.dim,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> HebelkiResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| HebelkiError::EmbeddingUnavailable(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HebelkiError::EmbeddingUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(HebelkiError::EmbeddingUnavailable(format!(
                "Embedding API error {status}: {resp_body}"
            )));
        }

        let vector = parse_embedding_response(&resp_body)?;
        if vector.len() != self.dimension {
            return Err(HebelkiError::EmbeddingUnavailable(format!(
                "Expected {} dimensions, service returned {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn parse_embedding_response(body: &serde_json::Value) -> HebelkiResult<Vec<f32>> {
    let values = body["data"][0]["embedding"].as_array().ok_or_else(|| {
        HebelkiError::EmbeddingUnavailable("Response has no data[0].embedding".to_string())
    })?;
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                HebelkiError::EmbeddingUnavailable("Non-numeric embedding component".to_string())
            })
        })
        .collect()
}
