//! Hybrid seed retrieval: vector, keyword and graph primitives fused by
//! reciprocal weighting.

use crate::graph_search::search_entity_lenient;
use finloom::error::Result;
use finloom::roster::detect_tickers;
use finloom::types::SearchHit;
use finloom_graph::PropertyGraph;
use finloom_index::{KeywordIndex, SearchFilters, VectorIndex};
use finloom_llm::{EmbeddingClient, RerankClient};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Weight of the vector primitive.
pub const VECTOR_WEIGHT: f64 = 0.7;
/// Weight of the keyword primitive.
pub const KEYWORD_WEIGHT: f64 = 0.3;
/// Weight of the graph primitive.
pub const GRAPH_WEIGHT: f64 = 0.5;
/// Queries with at least this many words get the larger keyword budget.
const KEYWORD_BOOST_THRESHOLD: usize = 3;
/// Graph search covers at most this many detected entities.
const MAX_GRAPH_ENTITIES: usize = 2;
/// Graph results fetched per entity.
const GRAPH_RESULTS_PER_ENTITY: usize = 5;

/// Keyword budget rule: `max(10, k/2)` for multi-word queries, else
/// `min(5, k/3)`.
pub fn keyword_limit(query: &str, top_k: usize) -> usize {
    if query.split_whitespace().count() >= KEYWORD_BOOST_THRESHOLD {
        (top_k / 2).max(10)
    } else {
        (top_k / 3).min(5)
    }
}

/// Merge primitive results by key, summing weighted scores and
/// accumulating contributing sources.
pub fn merge_results(
    vector: Vec<SearchHit>,
    keyword: Vec<SearchHit>,
    graph: Vec<SearchHit>,
) -> Vec<SearchHit> {
    let mut seen: HashMap<String, SearchHit> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    let mut absorb = |hits: Vec<SearchHit>, weight: f64, source: &str| {
        for mut hit in hits {
            let weighted = hit.score * weight;
            match seen.get_mut(&hit.key) {
                Some(existing) => {
                    existing.score += weighted;
                    if !existing.metadata.sources.iter().any(|s| s == source) {
                        existing.metadata.sources.push(source.to_string());
                    }
                    if existing.content.is_empty() && !hit.content.is_empty() {
                        existing.content = std::mem::take(&mut hit.content);
                    }
                }
                None => {
                    hit.score = weighted;
                    hit.metadata.sources = vec![source.to_string()];
                    order.push(hit.key.clone());
                    seen.insert(hit.key.clone(), hit);
                }
            }
        }
    };

    absorb(vector, VECTOR_WEIGHT, "vector");
    absorb(keyword, KEYWORD_WEIGHT, "keyword");
    absorb(graph, GRAPH_WEIGHT, "graph");

    let mut merged: Vec<SearchHit> = order.into_iter().filter_map(|k| seen.remove(&k)).collect();
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged
}

/// Hybrid searcher over the three primitives.
pub struct HybridSearcher<'a> {
    embeddings: &'a EmbeddingClient,
    vector: &'a VectorIndex,
    keyword: &'a KeywordIndex,
    graph: Option<&'a PropertyGraph>,
    reranker: Option<&'a RerankClient>,
}

impl std::fmt::Debug for HybridSearcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSearcher")
            .field("graph_enabled", &self.graph.is_some())
            .field("reranker_enabled", &self.reranker.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> HybridSearcher<'a> {
    /// Searcher over the mandatory primitives.
    pub const fn new(
        embeddings: &'a EmbeddingClient,
        vector: &'a VectorIndex,
        keyword: &'a KeywordIndex,
    ) -> Self {
        Self { embeddings, vector, keyword, graph: None, reranker: None }
    }

    /// Enable the knowledge-graph primitive.
    pub fn with_graph(mut self, graph: &'a PropertyGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Enable the final reranker.
    pub fn with_reranker(mut self, reranker: &'a RerankClient) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// One hybrid search. Degraded primitives log warnings and contribute
    /// nothing; the result list is always returned.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        ticker_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let filters = match ticker_filter {
            Some(ticker) => SearchFilters::ticker(ticker),
            None => SearchFilters::default(),
        };

        // Vector primitive
        let vector_hits = match self.embeddings.embed_one(query).await {
            Ok(embedding) => match self.vector.search(embedding, top_k * 2, &filters).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, "vector search degraded");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "query embedding failed, vector primitive skipped");
                Vec::new()
            }
        };

        // Keyword primitive
        let keyword_hits = match self.keyword.search(query, keyword_limit(query, top_k), &filters) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "keyword search degraded");
                Vec::new()
            }
        };

        // Graph primitive
        let mut graph_hits = Vec::new();
        if let Some(graph) = self.graph {
            let entities = detect_tickers(query);
            for entity in entities.iter().take(MAX_GRAPH_ENTITIES) {
                graph_hits.extend(search_entity_lenient(graph, entity, GRAPH_RESULTS_PER_ENTITY));
            }
        }

        debug!(
            vector = vector_hits.len(),
            keyword = keyword_hits.len(),
            graph = graph_hits.len(),
            "hybrid primitives returned"
        );

        let mut merged = merge_results(vector_hits, keyword_hits, graph_hits);

        if let Some(reranker) = self.reranker {
            match self.rerank(query, &merged, top_k, reranker).await {
                Ok(reranked) => return Ok(reranked),
                Err(e) => warn!(error = %e, "rerank degraded, using fused scores"),
            }
        }
        merged.truncate(top_k);
        Ok(merged)
    }

    async fn rerank(
        &self,
        query: &str,
        merged: &[SearchHit],
        top_k: usize,
        reranker: &RerankClient,
    ) -> Result<Vec<SearchHit>> {
        let documents: Vec<String> = merged.iter().map(|h| h.content.clone()).collect();
        let scored = reranker.rerank(query, &documents, top_k).await?;
        Ok(scored
            .into_iter()
            .filter_map(|(index, score)| {
                merged.get(index).map(|hit| {
                    let mut hit = hit.clone();
                    hit.score = score;
                    hit
                })
            })
            .collect())
    }
}
