//! Query decomposition for non-simple queries.
//!
//! The plan is consumed by the enclosing agent; the retrieval core itself
//! uses only the company list to split cross-filing seed budgets.

use crate::router::QueryType;
use finloom::roster::detect_tickers;
use finloom_llm::ChatClient;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DECOMPOSE_SYSTEM_PROMPT: &str = "Decompose a filing-analysis query into retrievable \
sub-queries. Respond with JSON: {\"companies\": [ticker], \"sub_queries\": [str], \
\"synthesis_hint\": str}";

/// Decomposition plan for a complex or cross-filing query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecompositionPlan {
    /// Tickers the query involves
    #[serde(default)]
    pub companies: Vec<String>,
    /// Sub-queries to retrieve independently
    #[serde(default)]
    pub sub_queries: Vec<String>,
    /// Hint for the downstream synthesis step
    #[serde(default)]
    pub synthesis_hint: String,
}

/// LLM-backed decomposer with a rule fallback.
#[derive(Debug)]
pub struct QueryDecomposer {
    chat: Option<ChatClient>,
}

impl QueryDecomposer {
    /// Rule-only decomposer.
    pub const fn new() -> Self {
        Self { chat: None }
    }

    /// Decomposer with the LLM enabled.
    pub const fn with_llm(chat: ChatClient) -> Self {
        Self { chat: Some(chat) }
    }

    /// Produce a plan. Simple queries pass through unchanged; LLM failures
    /// degrade to the detected-company fallback plan.
    pub async fn decompose(&self, query: &str, query_type: QueryType) -> DecompositionPlan {
        if query_type == QueryType::SimpleFact {
            return fallback_plan(query);
        }
        if let Some(chat) = &self.chat {
            match chat.complete_json::<DecompositionPlan>(DECOMPOSE_SYSTEM_PROMPT, query).await {
                Ok(mut plan) => {
                    if plan.sub_queries.is_empty() {
                        plan.sub_queries.push(query.to_string());
                    }
                    if plan.companies.is_empty() {
                        plan.companies =
                            detect_tickers(query).into_iter().map(str::to_string).collect();
                    }
                    return plan;
                }
                Err(e) => warn!(error = %e, "decomposition failed, using fallback plan"),
            }
        }
        fallback_plan(query)
    }
}

impl Default for QueryDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

fn fallback_plan(query: &str) -> DecompositionPlan {
    DecompositionPlan {
        companies: detect_tickers(query).into_iter().map(str::to_string).collect(),
        sub_queries: vec![query.to_string()],
        synthesis_hint: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_plan_detects_companies() {
        let decomposer = QueryDecomposer::new();
        let plan = decomposer
            .decompose("Compare AMD and Intel R&D spending", QueryType::CrossFiling)
            .await;
        assert_eq!(plan.companies, vec!["AMD", "INTC"]);
        assert_eq!(plan.sub_queries.len(), 1);
    }

    #[tokio::test]
    async fn test_simple_queries_pass_through() {
        let decomposer = QueryDecomposer::new();
        let plan = decomposer
            .decompose("What was Apple's revenue in 2023?", QueryType::SimpleFact)
            .await;
        assert_eq!(plan.companies, vec!["AAPL"]);
        assert_eq!(plan.sub_queries, vec!["What was Apple's revenue in 2023?"]);
    }
}
