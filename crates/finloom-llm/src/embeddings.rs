//! Batched embedding client with token-cost accounting.

use finloom::config::EmbeddingConfig;
use finloom::error::{FinloomError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// Client producing fixed-dimension dense vectors in batches.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    dimension: usize,
    batch_size: usize,
    max_retries: u32,
    total_tokens: AtomicU64,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl EmbeddingClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns `MissingConfig` when no API key is configured.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            FinloomError::MissingConfig("embeddings.api_key (set FINLOOM_EMBEDDINGS_API_KEY)".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(FinloomError::Network)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            total_tokens: AtomicU64::new(0),
        })
    }

    /// Vector dimensionality this client produces.
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Tokens consumed so far across all batches.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    /// Embed one text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| FinloomError::Embeddings("provider returned no vector".to_string()))
    }

    /// Embed texts in configured batches, preserving input order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest { model: &self.model, input: batch };

        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp.json().await.map_err(FinloomError::Network)?;
                    if let Some(usage) = parsed.usage {
                        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
                    }
                    let mut data = parsed.data;
                    data.sort_by_key(|d| d.index);
                    if data.len() != batch.len() {
                        return Err(FinloomError::Embeddings(format!(
                            "provider returned {} vectors for {} inputs",
                            data.len(),
                            batch.len()
                        )));
                    }
                    debug!(batch = batch.len(), "embedded batch");
                    return Ok(data.into_iter().map(|d| d.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retryable = status == 429 || (500..=599).contains(&status);
                    if !retryable || attempt >= self.max_retries {
                        return Err(FinloomError::Embeddings(format!("provider returned HTTP {status}")));
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(FinloomError::Embeddings(e.to_string()));
                    }
                }
            }
            let backoff = Duration::from_millis(500) * 2u32.pow(attempt.min(5));
            warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying embedding batch");
            sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = EmbeddingConfig::default();
        assert!(EmbeddingClient::new(&config).is_err());
    }
}
