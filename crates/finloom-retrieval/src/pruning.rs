//! LLM relevance pruning of hop candidates.
//!
//! Candidates are judged in batches against the query and a digest of the
//! context gathered so far. The pruner fails open: if the LLM is
//! unreachable, every candidate in the batch counts as kept, and only the
//! global keep cap applies. An infrastructure hiccup never loses an
//! already-retrieved passage.

use async_trait::async_trait;
use finloom::types::SearchHit;
use finloom_llm::ChatClient;
use serde::Deserialize;
use tracing::warn;

/// Candidates judged per LLM call.
const PRUNE_BATCH_SIZE: usize = 15;
/// Context entries summarized into the prompt.
const CONTEXT_ENTRIES: usize = 5;
/// Characters of each context entry shown.
const CONTEXT_ENTRY_CHARS: usize = 500;

const PRUNING_SYSTEM_PROMPT: &str = "You judge whether candidate passages from annual filings \
help answer a query, given the context already retrieved. Respond with JSON: \
{\"decisions\": [{\"id\": int, \"action\": \"keep\"|\"prune\", \"reason\": str}]}";

/// One hop candidate awaiting judgment.
#[derive(Debug, Clone)]
pub struct HopCandidate {
    /// Chunk id
    pub chunk_id: String,
    /// Preview text (200 chars from the graph node)
    pub preview: String,
    /// Ticker of the candidate's company
    pub ticker: String,
    /// Section item
    pub section_item: String,
    /// Filing date
    pub filing_date: String,
    /// Edge type that reached this candidate
    pub edge_type: String,
    /// Strongest incoming edge weight
    pub edge_weight: f64,
}

/// Outcome of pruning one hop's candidates.
#[derive(Debug, Clone, Default)]
pub struct PruningResult {
    /// Chunk ids kept, strongest first
    pub kept_chunk_ids: Vec<String>,
    /// Chunk ids pruned
    pub pruned_chunk_ids: Vec<String>,
}

/// Judgment interface, so the retriever can run without a live LLM.
#[async_trait]
pub trait CandidatePruner: Send + Sync {
    /// Judge candidates against the query and running context; keep at
    /// most `max_keep` in total.
    async fn prune(
        &self,
        query: &str,
        context: &[SearchHit],
        candidates: &[HopCandidate],
        max_keep: usize,
    ) -> PruningResult;
}

#[derive(Debug, Deserialize)]
struct Decisions {
    #[serde(default)]
    decisions: Vec<Decision>,
}

#[derive(Debug, Deserialize)]
struct Decision {
    id: usize,
    action: String,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

/// LLM-backed pruner.
#[derive(Debug)]
pub struct LlmPruner {
    chat: ChatClient,
}

impl LlmPruner {
    /// Pruner over a chat client.
    pub const fn new(chat: ChatClient) -> Self {
        Self { chat }
    }

    fn context_digest(context: &[SearchHit]) -> String {
        context
            .iter()
            .take(CONTEXT_ENTRIES)
            .map(|hit| {
                let excerpt: String = hit.content.chars().take(CONTEXT_ENTRY_CHARS).collect();
                format!(
                    "[{}|{}] {}",
                    hit.metadata.ticker.as_deref().unwrap_or("?"),
                    hit.metadata.section_item.as_deref().unwrap_or("?"),
                    excerpt
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn candidate_lines(batch: &[HopCandidate]) -> String {
        batch
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "[{i}][{}|{}|{}] {}",
                    c.ticker, c.section_item, c.filing_date, c.preview
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl CandidatePruner for LlmPruner {
    async fn prune(
        &self,
        query: &str,
        context: &[SearchHit],
        candidates: &[HopCandidate],
        max_keep: usize,
    ) -> PruningResult {
        let digest = Self::context_digest(context);
        let mut result = PruningResult::default();

        for batch in candidates.chunks(PRUNE_BATCH_SIZE) {
            let prompt = format!(
                "Query: {query}\n\nContext so far:\n{digest}\n\nCandidates:\n{}",
                Self::candidate_lines(batch)
            );

            let keep_flags: Vec<bool> = match self
                .chat
                .complete_json::<Decisions>(PRUNING_SYSTEM_PROMPT, &prompt)
                .await
            {
                Ok(parsed) => {
                    let mut flags = vec![false; batch.len()];
                    for decision in parsed.decisions {
                        if decision.id < flags.len() {
                            flags[decision.id] = decision.action.eq_ignore_ascii_case("keep");
                        }
                    }
                    flags
                }
                Err(e) => {
                    // Fail open: keep everything in the batch
                    warn!(error = %e, "candidate pruning failed, keeping batch");
                    vec![true; batch.len()]
                }
            };

            for (candidate, keep) in batch.iter().zip(keep_flags) {
                if keep && result.kept_chunk_ids.len() < max_keep {
                    result.kept_chunk_ids.push(candidate.chunk_id.clone());
                } else {
                    result.pruned_chunk_ids.push(candidate.chunk_id.clone());
                }
            }
        }
        result
    }
}

/// Pruner that keeps everything up to the cap; used when no LLM is
/// configured and by tests that exercise the fail-open path.
#[derive(Debug, Default)]
pub struct KeepAllPruner;

#[async_trait]
impl CandidatePruner for KeepAllPruner {
    async fn prune(
        &self,
        _query: &str,
        _context: &[SearchHit],
        candidates: &[HopCandidate],
        max_keep: usize,
    ) -> PruningResult {
        let mut result = PruningResult::default();
        for candidate in candidates {
            if result.kept_chunk_ids.len() < max_keep {
                result.kept_chunk_ids.push(candidate.chunk_id.clone());
            } else {
                result.pruned_chunk_ids.push(candidate.chunk_id.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, weight: f64) -> HopCandidate {
        HopCandidate {
            chunk_id: id.to_string(),
            preview: format!("preview {id}"),
            ticker: "AAPL".to_string(),
            section_item: "item_1a".to_string(),
            filing_date: "2024-11-01".to_string(),
            edge_type: "same_filing".to_string(),
            edge_weight: weight,
        }
    }

    #[tokio::test]
    async fn test_keep_all_respects_cap() {
        let candidates: Vec<HopCandidate> =
            (0..8).map(|i| candidate(&format!("c{i}"), 0.8)).collect();
        let result = KeepAllPruner.prune("q", &[], &candidates, 5).await;
        assert_eq!(result.kept_chunk_ids.len(), 5);
        assert_eq!(result.pruned_chunk_ids.len(), 3);
        // All candidates are accounted for
        assert_eq!(
            result.kept_chunk_ids.len() + result.pruned_chunk_ids.len(),
            candidates.len()
        );
    }

    #[tokio::test]
    async fn test_keep_all_under_cap() {
        let candidates = vec![candidate("c0", 0.8)];
        let result = KeepAllPruner.prune("q", &[], &candidates, 5).await;
        assert_eq!(result.kept_chunk_ids, vec!["c0"]);
        assert!(result.pruned_chunk_ids.is_empty());
    }
}
