//! Multi-hop expansion over the passage graph.
//!
//! Each hop walks the previous hop's chunks out along their strongest
//! edges, prunes the candidates with the LLM (failing open), and
//! accumulates the survivors with a per-hop score decay. Hop results carry
//! only graph previews until enrichment fetches full content from the
//! vector index.

use crate::pruning::{CandidatePruner, HopCandidate};
use crate::router::QueryType;
use finloom::config::HopConfig;
use finloom::types::{HitMetadata, SearchHit};
use finloom_graph::PassageGraph;
use finloom_index::VectorIndex;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// One trace entry per hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopTrace {
    /// Hop number (1-based)
    pub hop: u32,
    /// Candidates considered
    pub candidates_count: usize,
    /// Candidates kept
    pub kept_count: usize,
}

/// Collect neighbor candidates for one hop.
///
/// Edges below `min_edge_weight` are skipped, visited chunks are skipped,
/// each seed contributes at most `neighbors_per_seed` candidates (half the
/// slots reserved for cross-ticker neighbors on cross-filing queries),
/// duplicates keep their strongest incoming edge, and the total is capped
/// at `max_candidates_per_hop`.
pub fn collect_candidates(
    graph: &PassageGraph,
    seed_ids: &[String],
    visited: &HashSet<String>,
    cross_company: bool,
    config: &HopConfig,
) -> Vec<HopCandidate> {
    let mut best: HashMap<String, HopCandidate> = HashMap::new();

    for seed_id in seed_ids {
        let Some(seed_node) = graph.node(seed_id) else {
            continue;
        };
        let seed_ticker = seed_node.ticker.clone();

        let cross_slots = if cross_company { config.neighbors_per_seed / 2 } else { 0 };
        let same_slots = config.neighbors_per_seed - cross_slots;
        let mut same_count = 0usize;
        let mut cross_count = 0usize;

        for (neighbor_id, edge) in graph.neighbors_desc(seed_id) {
            if same_count >= same_slots && (!cross_company || cross_count >= cross_slots) {
                break;
            }
            if visited.contains(neighbor_id) {
                continue;
            }
            if edge.weight < config.min_edge_weight {
                // Neighbors are weight-descending; nothing further qualifies
                break;
            }
            let Some(neighbor) = graph.node(neighbor_id) else {
                continue;
            };

            if cross_company {
                let is_cross = neighbor.ticker != seed_ticker;
                if is_cross && cross_count >= cross_slots {
                    continue;
                }
                if !is_cross && same_count >= same_slots {
                    continue;
                }
                if is_cross {
                    cross_count += 1;
                } else {
                    same_count += 1;
                }
            } else {
                same_count += 1;
            }

            let candidate = HopCandidate {
                chunk_id: neighbor_id.to_string(),
                preview: neighbor.text_preview.clone(),
                ticker: neighbor.ticker.clone(),
                section_item: neighbor.section_item.clone(),
                filing_date: neighbor.filing_date.clone(),
                edge_type: edge.kind.type_name().to_string(),
                edge_weight: edge.weight,
            };
            match best.get(neighbor_id) {
                Some(existing) if existing.edge_weight >= edge.weight => {}
                _ => {
                    best.insert(neighbor_id.to_string(), candidate);
                }
            }
        }
    }

    let mut candidates: Vec<HopCandidate> = best.into_values().collect();
    candidates.sort_by(|a, b| {
        b.edge_weight
            .partial_cmp(&a.edge_weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(config.max_candidates_per_hop);
    candidates
}

/// Multi-hop retriever over a loaded passage graph.
pub struct HopRetriever<'a> {
    graph: &'a PassageGraph,
    pruner: &'a dyn CandidatePruner,
    config: HopConfig,
}

impl std::fmt::Debug for HopRetriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HopRetriever").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<'a> HopRetriever<'a> {
    /// Retriever over a graph and pruner.
    pub fn new(graph: &'a PassageGraph, pruner: &'a dyn CandidatePruner, config: HopConfig) -> Self {
        Self { graph, pruner, config }
    }

    /// Expand seed results through `max_hops` hops. Returns the full
    /// accumulated result set (seeds included) plus the hop trace.
    pub async fn expand(
        &self,
        query: &str,
        query_type: QueryType,
        seeds: Vec<SearchHit>,
        max_hops: u32,
    ) -> (Vec<SearchHit>, Vec<HopTrace>) {
        let mut results = seeds;
        let mut trace = Vec::new();

        let mut visited: HashSet<String> = results
            .iter()
            .filter_map(|hit| hit.metadata.chunk_id.clone())
            .collect();

        for hop in 1..=max_hops {
            let seed_ids: Vec<String> = results
                .iter()
                .filter(|hit| hit.metadata.hop_number == hop - 1)
                .filter_map(|hit| hit.metadata.chunk_id.clone())
                .collect();
            if seed_ids.is_empty() {
                trace.push(HopTrace { hop, candidates_count: 0, kept_count: 0 });
                break;
            }

            let candidates = collect_candidates(
                self.graph,
                &seed_ids,
                &visited,
                query_type == QueryType::CrossFiling,
                &self.config,
            );
            if candidates.is_empty() {
                trace.push(HopTrace { hop, candidates_count: 0, kept_count: 0 });
                break;
            }

            let pruned = self
                .pruner
                .prune(query, &results, &candidates, self.config.keep_per_hop)
                .await;

            // Every judged candidate is visited, kept or not
            for candidate in &candidates {
                visited.insert(candidate.chunk_id.clone());
            }

            let kept_set: HashSet<&String> = pruned.kept_chunk_ids.iter().collect();
            let decay = self.config.hop_decay.powi(hop as i32);
            let mut kept_count = 0usize;
            for candidate in &candidates {
                if !kept_set.contains(&candidate.chunk_id) {
                    continue;
                }
                kept_count += 1;
                results.push(SearchHit {
                    key: candidate.chunk_id.clone(),
                    content: candidate.preview.clone(),
                    score: candidate.edge_weight * decay,
                    metadata: HitMetadata {
                        chunk_id: Some(candidate.chunk_id.clone()),
                        ticker: Some(candidate.ticker.clone()),
                        company_name: self
                            .graph
                            .node(&candidate.chunk_id)
                            .map(|n| n.company_name.clone()),
                        section_item: Some(candidate.section_item.clone()),
                        section_title: self
                            .graph
                            .node(&candidate.chunk_id)
                            .map(|n| n.section_title.clone()),
                        filing_date: Some(candidate.filing_date.clone()),
                        accession_number: self
                            .graph
                            .node(&candidate.chunk_id)
                            .map(|n| n.accession_number.clone()),
                        fiscal_year: self.graph.node(&candidate.chunk_id).map(|n| n.fiscal_year),
                        sources: vec![format!("hoprag_hop{hop}")],
                        hop_number: hop,
                        edge_type: Some(candidate.edge_type.clone()),
                    },
                });
            }

            info!(hop, candidates = candidates.len(), kept = kept_count, "hop complete");
            trace.push(HopTrace { hop, candidates_count: candidates.len(), kept_count });
            if kept_count == 0 {
                break;
            }
        }

        (results, trace)
    }
}

/// Replace hop>=1 previews with full chunk content from the vector index.
/// A failed fetch leaves the previews in place with a warning.
pub async fn enrich_hop_results(results: &mut [SearchHit], vector: &VectorIndex) {
    let hop_chunk_ids: Vec<String> = results
        .iter()
        .filter(|hit| hit.metadata.hop_number >= 1)
        .filter_map(|hit| hit.metadata.chunk_id.clone())
        .collect();
    if hop_chunk_ids.is_empty() {
        return;
    }

    match vector.fetch_by_chunk_ids(&hop_chunk_ids).await {
        Ok(contents) => {
            for hit in results.iter_mut() {
                if hit.metadata.hop_number >= 1 {
                    if let Some(chunk_id) = &hit.metadata.chunk_id {
                        if let Some(content) = contents.get(chunk_id) {
                            hit.content = content.clone();
                        }
                    }
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "hop content enrichment failed, reranking on previews");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pruning::KeepAllPruner;
    use finloom::types::Chunk;

    fn chunk(id: &str, accession: &str, section: &str, index: usize) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            accession_number: accession.to_string(),
            section_item: section.to_string(),
            section_title: section.to_string(),
            chunk_index: index,
            token_count: 10,
            char_start: 0,
            char_end: 10,
            text: format!("full text of {id}"),
            contains_tables: false,
            contains_lists: false,
            contains_numbers: false,
            embedding: None,
        }
    }

    fn seed_hit(chunk_id: &str, ticker: &str) -> SearchHit {
        SearchHit {
            key: chunk_id.to_string(),
            content: "seed content".to_string(),
            score: 1.0,
            metadata: HitMetadata {
                chunk_id: Some(chunk_id.to_string()),
                ticker: Some(ticker.to_string()),
                sources: vec!["vector".to_string()],
                hop_number: 0,
                ..Default::default()
            },
        }
    }

    fn sample_graph() -> PassageGraph {
        let mut graph = PassageGraph::new();
        for (id, accession, section, index, ticker, date) in [
            ("s0", "FA", "item_1", 0, "AAPL", "2024-11-01"),
            ("n1", "FA", "item_1", 1, "AAPL", "2024-11-01"),
            ("n2", "FA", "item_7", 0, "AAPL", "2024-11-01"),
            ("x1", "FM", "item_1", 0, "MSFT", "2024-07-01"),
        ] {
            graph.add_chunk(&chunk(id, accession, section, index), ticker, &format!("{ticker} Inc."), date);
        }
        graph.build_same_filing_edges();
        // Cross-company pseudo edge
        graph.add_pseudo_query_edges("s0", &[("x1".to_string(), 0.9)], 0.6);
        graph
    }

    #[test]
    fn test_collect_candidates_respects_min_weight_and_visited() {
        let graph = sample_graph();
        let config = HopConfig::default();
        let visited: HashSet<String> = ["s0".to_string()].into();

        let candidates =
            collect_candidates(&graph, &["s0".to_string()], &visited, false, &config);
        let ids: Vec<&str> = candidates.iter().map(|c| c.chunk_id.as_str()).collect();

        // n1 (0.8 sequential), x1 (0.81 pseudo), n2 (0.5 cross_section)
        assert!(ids.contains(&"n1"));
        assert!(ids.contains(&"x1"));
        assert!(ids.contains(&"n2"));
        // Strongest edges first
        assert_eq!(candidates[0].chunk_id, "x1");
    }

    #[test]
    fn test_collect_candidates_min_edge_weight() {
        let graph = sample_graph();
        let config = HopConfig { min_edge_weight: 0.6, ..Default::default() };
        let visited = HashSet::new();

        let candidates =
            collect_candidates(&graph, &["s0".to_string()], &visited, false, &config);
        // The 0.5 cross-section edge is below the floor
        assert!(!candidates.iter().any(|c| c.chunk_id == "n2"));
    }

    #[test]
    fn test_cross_company_reservation() {
        // Seed with many same-ticker neighbors and some cross-ticker ones
        let mut graph = PassageGraph::new();
        graph.add_chunk(&chunk("seed", "F0", "item_1", 0), "AAPL", "Apple Inc.", "2024-11-01");
        for i in 0..10 {
            graph.add_chunk(
                &chunk(&format!("same{i}"), "F0", "item_1", i + 1),
                "AAPL",
                "Apple Inc.",
                "2024-11-01",
            );
            graph.add_pseudo_query_edges("seed", &[(format!("same{i}"), 0.95)], 0.6);
        }
        for i in 0..10 {
            graph.add_chunk(
                &chunk(&format!("cross{i}"), "F1", "item_1", i),
                "MSFT",
                "Microsoft Corp",
                "2024-07-01",
            );
            graph.add_pseudo_query_edges("seed", &[(format!("cross{i}"), 0.90)], 0.6);
        }

        let config = HopConfig::default(); // 15 neighbors/seed
        let candidates = collect_candidates(
            &graph,
            &["seed".to_string()],
            &HashSet::new(),
            true,
            &config,
        );

        let cross = candidates.iter().filter(|c| c.ticker == "MSFT").count();
        let same = candidates.iter().filter(|c| c.ticker == "AAPL").count();
        // 7 of 15 slots reserved for cross-ticker neighbors
        assert_eq!(cross, 7);
        assert_eq!(same, 8);
    }

    #[test]
    fn test_candidate_cap() {
        let mut graph = PassageGraph::new();
        graph.add_chunk(&chunk("seed", "F0", "item_1", 0), "AAPL", "Apple Inc.", "2024-11-01");
        for i in 0..50 {
            graph.add_chunk(
                &chunk(&format!("n{i}"), "F0", "item_1", i + 1),
                "AAPL",
                "Apple Inc.",
                "2024-11-01",
            );
            graph.add_pseudo_query_edges("seed", &[(format!("n{i}"), 0.95)], 0.6);
        }
        let config = HopConfig { neighbors_per_seed: 100, ..Default::default() };
        let candidates =
            collect_candidates(&graph, &["seed".to_string()], &HashSet::new(), false, &config);
        assert_eq!(candidates.len(), config.max_candidates_per_hop);
    }

    #[tokio::test]
    async fn test_expand_with_failopen_pruner() {
        let graph = sample_graph();
        let pruner = KeepAllPruner;
        let retriever = HopRetriever::new(&graph, &pruner, HopConfig::default());

        let (results, trace) = retriever
            .expand("query", QueryType::ComplexAnalysis, vec![seed_hit("s0", "AAPL")], 2)
            .await;

        // Hop 1 found the three neighbors, kept up to keep_per_hop
        assert_eq!(trace[0].hop, 1);
        assert_eq!(trace[0].candidates_count, 3);
        assert_eq!(trace[0].kept_count, 3);

        let hop1: Vec<&SearchHit> =
            results.iter().filter(|h| h.metadata.hop_number == 1).collect();
        assert_eq!(hop1.len(), 3);
        for hit in &hop1 {
            assert!(hit.metadata.sources.contains(&"hoprag_hop1".to_string()));
            assert!(hit.metadata.edge_type.is_some());
            // Scores decayed
            assert!(hit.score < 0.9);
        }
    }

    #[tokio::test]
    async fn test_expand_stops_when_no_candidates() {
        let mut graph = PassageGraph::new();
        graph.add_chunk(&chunk("lonely", "F0", "item_1", 0), "AAPL", "Apple Inc.", "2024-11-01");
        let pruner = KeepAllPruner;
        let retriever = HopRetriever::new(&graph, &pruner, HopConfig::default());

        let (results, trace) = retriever
            .expand("query", QueryType::ComplexAnalysis, vec![seed_hit("lonely", "AAPL")], 3)
            .await;

        assert_eq!(results.len(), 1); // just the seed
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0], HopTrace { hop: 1, candidates_count: 0, kept_count: 0 });
    }

    #[tokio::test]
    async fn test_hop_decay_applied_per_hop() {
        // Chain: s0 -> n1 -> n1b so hop 2 exists
        let mut graph = PassageGraph::new();
        for (id, index) in [("s0", 0), ("n1", 1), ("n1b", 2)] {
            graph.add_chunk(&chunk(id, "FA", "item_1", index), "AAPL", "Apple Inc.", "2024-11-01");
        }
        graph.build_same_filing_edges(); // sequential 0.8 edges along the chain

        let pruner = KeepAllPruner;
        let retriever = HopRetriever::new(&graph, &pruner, HopConfig::default());
        let (results, trace) = retriever
            .expand("query", QueryType::ComplexAnalysis, vec![seed_hit("s0", "AAPL")], 2)
            .await;

        assert_eq!(trace.len(), 2);
        let hop1 = results.iter().find(|h| h.metadata.hop_number == 1).unwrap();
        let hop2 = results.iter().find(|h| h.metadata.hop_number == 2).unwrap();
        assert!((hop1.score - 0.8 * 0.85).abs() < 1e-9);
        assert!((hop2.score - 0.8 * 0.85 * 0.85).abs() < 1e-9);
    }
}
