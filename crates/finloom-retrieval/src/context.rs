//! The retrieval entry point.
//!
//! Owns the search primitives and lazy slots: the passage graph is a large
//! binary artifact, so it is loaded only when a query actually needs
//! multi-hop expansion. The entry point always returns a list; degraded
//! primitives log warnings and contribute nothing.

use crate::decompose::QueryDecomposer;
use crate::hoprag::{HopRetriever, enrich_hop_results};
use crate::hybrid::HybridSearcher;
use crate::pruning::{CandidatePruner, KeepAllPruner, LlmPruner};
use crate::router::{QueryRouter, QueryType};
use finloom::config::HopConfig;
use finloom::error::Result;
use finloom::roster::detect_tickers;
use finloom::types::SearchHit;
use finloom_graph::{PassageGraph, PropertyGraph};
use finloom_index::{KeywordIndex, VectorIndex};
use finloom_llm::{ChatClient, EmbeddingClient, RerankClient};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Hybrid multi-hop retriever consumed by the downstream agent.
pub struct Retriever {
    embeddings: EmbeddingClient,
    vector: VectorIndex,
    keyword: KeywordIndex,
    knowledge_graph: Option<PropertyGraph>,
    reranker: Option<RerankClient>,
    router: QueryRouter,
    decomposer: QueryDecomposer,
    pruner: Box<dyn CandidatePruner>,
    hop_config: HopConfig,
    passage_graph_path: PathBuf,
    // Lazy slot: loaded on the first multi-hop query
    passage_graph: tokio::sync::OnceCell<Option<PassageGraph>>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("hop_config", &self.hop_config)
            .field("passage_graph_path", &self.passage_graph_path)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Assemble a retriever from its primitives.
    ///
    /// `chat` enables the LLM router, decomposer and pruner; without it the
    /// rule paths and fail-open pruning run alone.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embeddings: EmbeddingClient,
        vector: VectorIndex,
        keyword: KeywordIndex,
        knowledge_graph: Option<PropertyGraph>,
        reranker: Option<RerankClient>,
        chat: Option<(ChatClient, ChatClient, ChatClient)>,
        hop_config: HopConfig,
        passage_graph_path: PathBuf,
    ) -> Self {
        let (router, decomposer, pruner): (QueryRouter, QueryDecomposer, Box<dyn CandidatePruner>) =
            match chat {
                Some((router_chat, decomposer_chat, pruner_chat)) => (
                    QueryRouter::with_llm(router_chat),
                    QueryDecomposer::with_llm(decomposer_chat),
                    Box::new(LlmPruner::new(pruner_chat)),
                ),
                None => (QueryRouter::new(), QueryDecomposer::new(), Box::new(KeepAllPruner)),
            };

        Self {
            embeddings,
            vector,
            keyword,
            knowledge_graph,
            reranker,
            router,
            decomposer,
            pruner,
            hop_config,
            passage_graph_path,
            passage_graph: tokio::sync::OnceCell::new(),
        }
    }

    async fn passage_graph(&self) -> Option<&PassageGraph> {
        self.passage_graph
            .get_or_init(|| async {
                match PassageGraph::load(&self.passage_graph_path) {
                    Ok(graph) => {
                        info!(
                            nodes = graph.node_count(),
                            edges = graph.edge_count(),
                            "passage graph loaded"
                        );
                        Some(graph)
                    }
                    Err(e) => {
                        warn!(path = %self.passage_graph_path.display(), error = %e, "passage graph unavailable, multi-hop disabled");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    fn hybrid(&self) -> HybridSearcher<'_> {
        let mut searcher = HybridSearcher::new(&self.embeddings, &self.vector, &self.keyword);
        if let Some(graph) = &self.knowledge_graph {
            searcher = searcher.with_graph(graph);
        }
        // The final rerank runs over the accumulated hop results instead
        searcher
    }

    /// Retrieve passages for a query.
    ///
    /// Routes the query, runs hybrid seed retrieval (split per ticker for
    /// cross-filing queries), expands through the passage graph when the
    /// hop budget allows, enriches hop results with full content, and
    /// applies the final rerank.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        max_hops: Option<u32>,
    ) -> Result<Vec<SearchHit>> {
        let decision = self.router.route(query).await;
        let max_hops = max_hops.unwrap_or(decision.max_hops);
        info!(
            query_type = decision.query_type.as_str(),
            max_hops,
            confidence = decision.confidence,
            "query routed"
        );

        // Decomposition informs cross-filing seed retrieval; the plan
        // itself belongs to the enclosing agent
        let plan = self.decomposer.decompose(query, decision.query_type).await;

        let mut results = self
            .seed_retrieval(query, decision.query_type, &plan.companies)
            .await?;

        if max_hops > 0 {
            if let Some(graph) = self.passage_graph().await {
                let retriever = HopRetriever::new(graph, self.pruner.as_ref(), self.hop_config);
                let (expanded, trace) = retriever
                    .expand(query, decision.query_type, results, max_hops)
                    .await;
                results = expanded;
                for entry in &trace {
                    info!(
                        hop = entry.hop,
                        candidates = entry.candidates_count,
                        kept = entry.kept_count,
                        "hop trace"
                    );
                }
                enrich_hop_results(&mut results, &self.vector).await;
            }
        }

        // Final rerank over everything accumulated, otherwise score order
        if let Some(reranker) = &self.reranker {
            let documents: Vec<String> = results.iter().map(|hit| hit.content.clone()).collect();
            match reranker.rerank(query, &documents, top_k).await {
                Ok(scored) => {
                    let mut reranked: Vec<SearchHit> = scored
                        .into_iter()
                        .filter_map(|(index, score)| {
                            results.get(index).map(|hit| {
                                let mut hit = hit.clone();
                                hit.score = score;
                                hit
                            })
                        })
                        .collect();
                    reranked.truncate(top_k);
                    return Ok(reranked);
                }
                Err(e) => warn!(error = %e, "final rerank degraded, using fused scores"),
            }
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    /// Hop-0 retrieval: one hybrid search, or a per-ticker split for
    /// cross-filing queries mentioning at least two companies.
    async fn seed_retrieval(
        &self,
        query: &str,
        query_type: QueryType,
        plan_companies: &[String],
    ) -> Result<Vec<SearchHit>> {
        let initial_top_k = self.hop_config.initial_top_k;

        let mut tickers: Vec<String> = if plan_companies.is_empty() {
            detect_tickers(query).into_iter().map(str::to_string).collect()
        } else {
            plan_companies.to_vec()
        };
        tickers.dedup();

        if query_type == QueryType::CrossFiling && tickers.len() >= 2 {
            let per_ticker = (initial_top_k / tickers.len()).max(1);
            let mut seen: HashSet<String> = HashSet::new();
            let mut seeds = Vec::new();
            for ticker in &tickers {
                let hits = self.hybrid().search(query, per_ticker, Some(ticker)).await?;
                for hit in hits {
                    if seen.insert(hit.key.clone()) {
                        seeds.push(hit);
                    }
                }
            }
            return Ok(seeds);
        }

        self.hybrid().search(query, initial_top_k, None).await
    }
}
