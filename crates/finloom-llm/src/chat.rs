//! Chat-completion client for an OpenAI-compatible provider.
//!
//! Used for query routing, candidate pruning, entity extraction, community
//! summarization and pseudo-query generation. Calls retry up to the
//! configured bound with exponential backoff; callers decide whether a
//! final failure fails open or closed.

use finloom::config::LlmConfig;
use finloom::error::{FinloomError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for chat completions.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns `MissingConfig` when no API key is configured.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| FinloomError::MissingConfig("llm.api_key (set FINLOOM_LLM_API_KEY)".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(FinloomError::Network)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// One completion with a system and user message.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.request(system, user, None).await
    }

    /// One completion constrained to a JSON object, deserialized into `T`.
    pub async fn complete_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T> {
        let raw = self
            .request(system, user, Some(ResponseFormat { format_type: "json_object" }))
            .await?;
        let stripped = strip_code_fences(&raw);
        serde_json::from_str(stripped)
            .map_err(|e| FinloomError::Llm(format!("response did not match schema: {e}: {stripped}")))
    }

    async fn request(&self, system: &str, user: &str, format: Option<ResponseFormat>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.0,
            response_format: format,
        };

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
                    let parsed: ChatResponse = resp.json().await.map_err(FinloomError::Network)?;
                    return parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| FinloomError::Llm("empty choices in response".to_string()));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retryable = status == 429 || (500..=599).contains(&status);
                    if !retryable || attempt >= self.max_retries {
                        return Err(FinloomError::Llm(format!("provider returned HTTP {status}")));
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(FinloomError::Llm(e.to_string()));
                    }
                }
            }
            let backoff = Duration::from_millis(500) * 2u32.pow(attempt.min(5));
            warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying chat completion");
            sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Providers occasionally wrap JSON answers in markdown fences even in
/// JSON mode.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}
