//! Optional cross-encoder reranker client.

use finloom::config::RerankConfig;
use finloom::error::{FinloomError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Client scoring documents against a query.
pub struct RerankClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for RerankClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RerankClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RerankClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns `MissingConfig` when no API key is configured.
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            FinloomError::MissingConfig("rerank.api_key (set FINLOOM_RERANK_API_KEY)".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(FinloomError::Network)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Score `documents` against `query`; returns `(input_index, score)`
    /// pairs for the `top_n` best, strongest first.
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<(usize, f64)>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/rerank", self.base_url);
        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: top_n.min(documents.len()),
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FinloomError::Reranker(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FinloomError::Reranker(format!(
                "provider returned HTTP {}",
                resp.status().as_u16()
            )));
        }

        let parsed: RerankResponse = resp
            .json()
            .await
            .map_err(|e| FinloomError::Reranker(e.to_string()))?;
        Ok(parsed.results.into_iter().map(|r| (r.index, r.relevance_score)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_requires_api_key() {
        let config = RerankConfig::default();
        assert!(RerankClient::new(&config).is_err());
    }
}
