//! Query routing: classify a query and pick its hop budget.
//!
//! A rule pass over company mentions and intent lexicons decides most
//! queries for free; ambiguous ones go to the LLM classifier. LLM failure
//! defaults to complex analysis, never to an error.

use finloom::roster::detect_tickers;
use finloom_llm::ChatClient;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Query classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Single fact from one filing section
    SimpleFact,
    /// Multiple connected pieces within one company's filings
    ComplexAnalysis,
    /// Comparison across companies or industry-wide patterns
    CrossFiling,
}

impl QueryType {
    /// Default hop budget for this query type.
    pub const fn default_max_hops(&self) -> u32 {
        match self {
            Self::SimpleFact => 0,
            Self::ComplexAnalysis => 2,
            Self::CrossFiling => 3,
        }
    }

    /// Wire name used by the LLM classifier.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleFact => "simple_fact",
            Self::ComplexAnalysis => "complex_analysis",
            Self::CrossFiling => "cross_filing",
        }
    }
}

/// Outcome of routing one query.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Classification
    pub query_type: QueryType,
    /// Hop budget for multi-hop expansion
    pub max_hops: u32,
    /// Classifier confidence
    pub confidence: f64,
    /// Why the classifier decided this
    pub reasoning: String,
}

static CROSS_FILING_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(compare|comparison|versus|vs\.?|difference between|relative to|industry|sector|peers?|competitors?|against|benchmark)\b",
    )
    .expect("valid regex")
});

static COMPLEX_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(trend|over time|year-over-year|yoy|changed|growth|decline|historically|evolution|trajectory|why|because|impact|effect|caused by|led to|resulted in|driven by|attributed to|relationship between|correlation)\b",
    )
    .expect("valid regex")
});

static SIMPLE_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what is|what was|who is|who was|when did|how much|how many|name the|list the|define)\b",
    )
    .expect("valid regex")
});

const ROUTER_SYSTEM_PROMPT: &str = "You classify filing-analysis queries into three categories. \
SIMPLE_FACT: a single fact from one filing section. \
COMPLEX_ANALYSIS: connecting multiple pieces of information within one company's filings. \
CROSS_FILING: comparing multiple companies or industry-wide patterns. \
Respond with JSON: {\"type\": \"simple_fact\"|\"complex_analysis\"|\"cross_filing\", \"reasoning\": \"brief explanation\"}";

#[derive(Debug, Deserialize)]
struct LlmClassification {
    #[serde(rename = "type")]
    query_type: String,
    #[serde(default)]
    reasoning: String,
}

/// Rule-based classification; `None` means ambiguous.
pub fn rule_based_classify(query: &str) -> Option<RoutingDecision> {
    let companies = detect_tickers(query);
    let has_cross_words = CROSS_FILING_WORDS.is_match(query);
    let has_complex_words = COMPLEX_WORDS.is_match(query);
    let has_simple_pattern = SIMPLE_PATTERNS.is_match(query);
    let word_count = query.split_whitespace().count();

    if companies.len() >= 2 {
        return Some(decision(
            QueryType::CrossFiling,
            0.95,
            format!("multiple companies mentioned: {}", companies.join(", ")),
        ));
    }
    if companies.len() == 1 && has_cross_words {
        return Some(decision(
            QueryType::CrossFiling,
            0.85,
            "one company plus comparison language".to_string(),
        ));
    }
    if has_complex_words && !has_simple_pattern {
        return Some(decision(
            QueryType::ComplexAnalysis,
            0.80,
            "temporal or causal language".to_string(),
        ));
    }
    if has_simple_pattern && word_count <= 12 && !has_complex_words && !has_cross_words {
        return Some(decision(
            QueryType::SimpleFact,
            0.85,
            "short factual question".to_string(),
        ));
    }
    None
}

fn decision(query_type: QueryType, confidence: f64, reasoning: String) -> RoutingDecision {
    RoutingDecision {
        query_type,
        max_hops: query_type.default_max_hops(),
        confidence,
        reasoning,
    }
}

/// Query router: rules first, LLM for the ambiguous remainder.
#[derive(Debug)]
pub struct QueryRouter {
    chat: Option<ChatClient>,
}

impl QueryRouter {
    /// Rules-only router (ambiguous queries default to complex analysis).
    pub const fn new() -> Self {
        Self { chat: None }
    }

    /// Router with the LLM fallback enabled.
    pub const fn with_llm(chat: ChatClient) -> Self {
        Self { chat: Some(chat) }
    }

    /// Classify one query.
    pub async fn route(&self, query: &str) -> RoutingDecision {
        if let Some(decided) = rule_based_classify(query) {
            debug!(query_type = decided.query_type.as_str(), confidence = decided.confidence, "query routed by rules");
            return decided;
        }

        if let Some(chat) = &self.chat {
            match chat.complete_json::<LlmClassification>(ROUTER_SYSTEM_PROMPT, query).await {
                Ok(classified) => {
                    let query_type = match classified.query_type.as_str() {
                        "simple_fact" => QueryType::SimpleFact,
                        "cross_filing" => QueryType::CrossFiling,
                        _ => QueryType::ComplexAnalysis,
                    };
                    return decision(query_type, 0.7, classified.reasoning);
                }
                Err(e) => {
                    warn!(error = %e, "LLM routing failed, defaulting to complex analysis");
                }
            }
        }

        decision(
            QueryType::ComplexAnalysis,
            0.5,
            "ambiguous query, defaulted".to_string(),
        )
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_simple_fact_example() {
        let decided = rule_based_classify("What was Apple's revenue in 2023?").unwrap();
        assert_eq!(decided.query_type, QueryType::SimpleFact);
        assert_eq!(decided.max_hops, 0);
    }

    #[test]
    fn test_cross_filing_example() {
        let decided =
            rule_based_classify("Compare AMD and Intel R&D spending over the last five years").unwrap();
        assert_eq!(decided.query_type, QueryType::CrossFiling);
        assert_eq!(decided.max_hops, 3);
    }

    #[test]
    fn test_one_company_never_cross_filing_without_comparison() {
        // A single company mention classifies simple or complex, never cross
        for query in [
            "What was Apple's revenue in 2023?",
            "Why did Apple's margins decline over time?",
        ] {
            if let Some(decided) = rule_based_classify(query) {
                assert_ne!(decided.query_type, QueryType::CrossFiling, "{query}");
            }
        }
    }

    #[rstest]
    #[case("How did Microsoft's cloud growth trend impact margins?", QueryType::ComplexAnalysis)]
    #[case("Compare Apple against its competitors", QueryType::CrossFiling)]
    #[case("Who is NVIDIA's CEO?", QueryType::SimpleFact)]
    fn test_rule_classification(#[case] query: &str, #[case] expected: QueryType) {
        assert_eq!(rule_based_classify(query).unwrap().query_type, expected, "{query}");
    }

    #[test]
    fn test_long_simple_pattern_is_ambiguous() {
        // Simple lexicon but beyond the 12-word limit: rules abstain
        let query = "What is the complete detailed breakdown of all the operating segments reported by the company in its most recent filing?";
        assert!(rule_based_classify(query).is_none());
    }

    #[tokio::test]
    async fn test_ambiguous_defaults_to_complex_without_llm() {
        let router = QueryRouter::new();
        let decided = router.route("Summarize the filings").await;
        assert_eq!(decided.query_type, QueryType::ComplexAnalysis);
        assert_eq!(decided.max_hops, 2);
    }
}
