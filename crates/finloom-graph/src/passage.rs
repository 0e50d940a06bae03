//! In-memory passage graph over filing chunks.
//!
//! Nodes are chunks (metadata plus a 200-character preview, never the full
//! text); edges are typed logical connections. The graph is an undirected
//! simple graph: no self-loops, at most one edge per node pair, and a
//! later insertion replaces an existing edge only with a higher weight.

use chrono::Datelike;
use finloom::error::{FinloomError, Result};
use finloom::roster::detect_tickers;
use finloom::types::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Weight of sequential same-filing edges.
const WEIGHT_SEQUENTIAL: f64 = 0.8;
/// Weight of cross-section same-filing edges.
const WEIGHT_CROSS_SECTION: f64 = 0.5;
/// Weight of entity co-occurrence edges.
const WEIGHT_ENTITY: f64 = 0.6;
/// Weight of temporal edges.
const WEIGHT_TEMPORAL: f64 = 0.7;
/// Pseudo-query weight factor applied to the similarity score.
const WEIGHT_PSEUDO_FACTOR: f64 = 0.9;

/// Typed payload of one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeKind {
    /// Within one filing: `sequential` or `cross_section`
    SameFiling {
        /// `sequential` or `cross_section`
        subtype: String,
    },
    /// Two chunks from different filings mention the same company
    EntityCooccurrence {
        /// Mentioned ticker
        entity: String,
    },
    /// Same company + section across consecutive fiscal years
    Temporal {
        /// Earlier year
        year_from: i32,
        /// Later year
        year_to: i32,
    },
    /// LLM-generated follow-up question matched this neighbor
    PseudoQuery,
}

impl EdgeKind {
    /// Stable type name used in statistics and result metadata.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SameFiling { .. } => "same_filing",
            Self::EntityCooccurrence { .. } => "entity_cooccurrence",
            Self::Temporal { .. } => "temporal",
            Self::PseudoQuery => "pseudo_query",
        }
    }
}

/// One weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageEdge {
    /// Weight in [0, 1]
    pub weight: f64,
    /// Typed payload
    pub kind: EdgeKind,
}

/// Node attributes kept for traversal (no full text).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageNode {
    /// Company ticker
    pub ticker: String,
    /// Company name
    pub company_name: String,
    /// Filing date (ISO)
    pub filing_date: String,
    /// Fiscal year parsed from the filing date
    pub fiscal_year: i32,
    /// Accession number
    pub accession_number: String,
    /// Section item id
    pub section_item: String,
    /// Section title
    pub section_title: String,
    /// Chunk position within the filing
    pub chunk_index: usize,
    /// First 200 characters of the chunk text
    pub text_preview: String,
}

/// Graph statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Node count
    pub node_count: usize,
    /// Edge count
    pub edge_count: usize,
    /// Edge counts by type name
    pub edges_by_type: BTreeMap<String, usize>,
    /// Average degree
    pub avg_degree: f64,
    /// Maximum degree
    pub max_degree: usize,
    /// Nodes with no edges
    pub isolated_nodes: usize,
    /// Connected component count
    pub connected_components: usize,
}

/// In-memory undirected simple graph over chunks.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PassageGraph {
    nodes: HashMap<String, PassageNode>,
    // Adjacency mirrored on both endpoints; the canonical edge count is
    // tracked separately
    adjacency: HashMap<String, BTreeMap<String, PassageEdge>>,
    edge_count: usize,
    // Build-time indexes and full texts; not part of the persisted graph
    #[serde(skip)]
    by_accession: HashMap<String, Vec<String>>,
    #[serde(skip)]
    by_ticker_section_year: HashMap<(String, String, i32), Vec<String>>,
    #[serde(skip)]
    texts: HashMap<String, String>,
}

impl PassageGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk as a node. The full text is kept only for edge
    /// building, never serialized.
    pub fn add_chunk(&mut self, chunk: &Chunk, ticker: &str, company_name: &str, filing_date: &str) {
        let fiscal_year = filing_date
            .get(..4)
            .and_then(|y| y.parse().ok())
            .unwrap_or_else(|| chrono::Utc::now().year());

        let node = PassageNode {
            ticker: ticker.to_string(),
            company_name: company_name.to_string(),
            filing_date: filing_date.to_string(),
            fiscal_year,
            accession_number: chunk.accession_number.clone(),
            section_item: chunk.section_item.clone(),
            section_title: chunk.section_title.clone(),
            chunk_index: chunk.chunk_index,
            text_preview: chunk.text_preview(),
        };

        self.by_accession
            .entry(chunk.accession_number.clone())
            .or_default()
            .push(chunk.chunk_id.clone());
        self.by_ticker_section_year
            .entry((ticker.to_string(), chunk.section_item.clone(), fiscal_year))
            .or_default()
            .push(chunk.chunk_id.clone());
        self.texts.insert(chunk.chunk_id.clone(), chunk.text.clone());
        self.nodes.insert(chunk.chunk_id.clone(), node);
    }

    /// Node count.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edge count.
    pub const fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Whether a node exists.
    pub fn contains_node(&self, chunk_id: &str) -> bool {
        self.nodes.contains_key(chunk_id)
    }

    /// Node attributes.
    pub fn node(&self, chunk_id: &str) -> Option<&PassageNode> {
        self.nodes.get(chunk_id)
    }

    /// A node's edges, strongest first.
    pub fn neighbors_desc(&self, chunk_id: &str) -> Vec<(&str, &PassageEdge)> {
        let mut neighbors: Vec<(&str, &PassageEdge)> = self
            .adjacency
            .get(chunk_id)
            .map(|edges| edges.iter().map(|(id, edge)| (id.as_str(), edge)).collect())
            .unwrap_or_default();
        neighbors.sort_by(|a, b| b.1.weight.partial_cmp(&a.1.weight).unwrap_or(std::cmp::Ordering::Equal));
        neighbors
    }

    /// Edge between two nodes, when present.
    pub fn edge(&self, a: &str, b: &str) -> Option<&PassageEdge> {
        self.adjacency.get(a).and_then(|edges| edges.get(b))
    }

    /// Insert an undirected edge. Self-loops are rejected; an existing
    /// edge survives unless the new one is strictly heavier.
    pub fn add_edge(&mut self, a: &str, b: &str, edge: PassageEdge) -> bool {
        if a == b || !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return false;
        }
        if let Some(existing) = self.edge(a, b) {
            if existing.weight >= edge.weight {
                return false;
            }
            // Replacement: drop the old edge first
            self.remove_edge_internal(a, b);
        }
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), edge.clone());
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), edge);
        self.edge_count += 1;
        true
    }

    fn remove_edge_internal(&mut self, a: &str, b: &str) {
        let removed = self
            .adjacency
            .get_mut(a)
            .is_some_and(|edges| edges.remove(b).is_some());
        if let Some(edges) = self.adjacency.get_mut(b) {
            edges.remove(a);
        }
        if removed {
            self.edge_count -= 1;
        }
    }

    /// Same-filing edges: sequential neighbors within a section at 0.8,
    /// first chunks of each section cross-linked at 0.5.
    pub fn build_same_filing_edges(&mut self) -> usize {
        let mut added = 0usize;
        let accessions: Vec<String> = self.by_accession.keys().cloned().collect();

        for accession in accessions {
            let chunk_ids = self.by_accession[&accession].clone();
            let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for chunk_id in &chunk_ids {
                if let Some(node) = self.nodes.get(chunk_id) {
                    sections.entry(node.section_item.clone()).or_default().push(chunk_id.clone());
                }
            }
            for ids in sections.values_mut() {
                ids.sort_by_key(|id| self.nodes[id].chunk_index);
            }

            for ids in sections.values() {
                for pair in ids.windows(2) {
                    if self.add_edge(
                        &pair[0],
                        &pair[1],
                        PassageEdge {
                            weight: WEIGHT_SEQUENTIAL,
                            kind: EdgeKind::SameFiling { subtype: "sequential".to_string() },
                        },
                    ) {
                        added += 1;
                    }
                }
            }

            let heads: Vec<String> = sections.values().filter_map(|ids| ids.first().cloned()).collect();
            for i in 0..heads.len() {
                for j in i + 1..heads.len() {
                    if self.add_edge(
                        &heads[i],
                        &heads[j],
                        PassageEdge {
                            weight: WEIGHT_CROSS_SECTION,
                            kind: EdgeKind::SameFiling { subtype: "cross_section".to_string() },
                        },
                    ) {
                        added += 1;
                    }
                }
            }
        }
        info!(added, "same-filing edges built");
        added
    }

    /// Entity co-occurrence edges: chunks from different filings that both
    /// mention the same roster company. A chunk's own company is ignored.
    /// At most `max_per_entity` chunks per filing contribute per entity,
    /// and each chunk caps out at `5 * max_per_entity` such edges.
    pub fn build_entity_cooccurrence_edges(&mut self, max_per_entity: usize) -> usize {
        // entity -> accession -> chunk ids
        let mut entity_index: HashMap<String, BTreeMap<String, Vec<String>>> = HashMap::new();
        let mut sorted_ids: Vec<&String> = self.nodes.keys().collect();
        sorted_ids.sort();

        for chunk_id in sorted_ids {
            let node = &self.nodes[chunk_id];
            let Some(text) = self.texts.get(chunk_id) else {
                continue;
            };
            for entity in detect_tickers(text) {
                if entity == node.ticker {
                    continue;
                }
                entity_index
                    .entry(entity.to_string())
                    .or_default()
                    .entry(node.accession_number.clone())
                    .or_default()
                    .push(chunk_id.clone());
            }
        }

        let per_chunk_cap = max_per_entity * 5;
        let mut chunk_edge_counts: HashMap<String, usize> = HashMap::new();
        let mut added = 0usize;

        let mut entities: Vec<String> = entity_index.keys().cloned().collect();
        entities.sort();
        for entity in entities {
            let by_accession = &entity_index[&entity];
            if by_accession.len() < 2 {
                continue;
            }
            let accessions: Vec<&String> = by_accession.keys().collect();
            for i in 0..accessions.len() {
                for j in i + 1..accessions.len() {
                    for a in by_accession[accessions[i]].iter().take(max_per_entity) {
                        if chunk_edge_counts.get(a).copied().unwrap_or(0) >= per_chunk_cap {
                            continue;
                        }
                        for b in by_accession[accessions[j]].iter().take(max_per_entity) {
                            if chunk_edge_counts.get(b).copied().unwrap_or(0) >= per_chunk_cap {
                                continue;
                            }
                            if self.edge(a, b).is_some() {
                                continue;
                            }
                            if self.add_edge(
                                a,
                                b,
                                PassageEdge {
                                    weight: WEIGHT_ENTITY,
                                    kind: EdgeKind::EntityCooccurrence { entity: entity.clone() },
                                },
                            ) {
                                added += 1;
                                *chunk_edge_counts.entry(a.clone()).or_default() += 1;
                                *chunk_edge_counts.entry(b.clone()).or_default() += 1;
                            }
                        }
                    }
                }
            }
        }
        info!(added, "entity co-occurrence edges built");
        added
    }

    /// Temporal edges: same `(ticker, section)` across consecutive fiscal
    /// years (gap of at most two), aligned by chunk position.
    pub fn build_temporal_edges(&mut self) -> usize {
        let mut ticker_sections: HashMap<(String, String), Vec<i32>> = HashMap::new();
        for (ticker, section, year) in self.by_ticker_section_year.keys() {
            ticker_sections
                .entry((ticker.clone(), section.clone()))
                .or_default()
                .push(*year);
        }

        let mut added = 0usize;
        let mut keys: Vec<(String, String)> = ticker_sections.keys().cloned().collect();
        keys.sort();

        for key in keys {
            let mut years = ticker_sections[&key].clone();
            years.sort_unstable();
            years.dedup();

            for window in years.windows(2) {
                let (year_a, year_b) = (window[0], window[1]);
                if year_b - year_a > 2 {
                    continue;
                }
                let mut ids_a =
                    self.by_ticker_section_year[&(key.0.clone(), key.1.clone(), year_a)].clone();
                let mut ids_b =
                    self.by_ticker_section_year[&(key.0.clone(), key.1.clone(), year_b)].clone();
                ids_a.sort_by_key(|id| self.nodes[id].chunk_index);
                ids_b.sort_by_key(|id| self.nodes[id].chunk_index);

                for (a, b) in ids_a.iter().zip(ids_b.iter()) {
                    if self.add_edge(
                        a,
                        b,
                        PassageEdge {
                            weight: WEIGHT_TEMPORAL,
                            kind: EdgeKind::Temporal { year_from: year_a, year_to: year_b },
                        },
                    ) {
                        added += 1;
                    }
                }
            }
        }
        info!(added, "temporal edges built");
        added
    }

    /// Add pseudo-query edges from one source chunk to vector-search
    /// neighbors. Skips self-loops, unknown targets, existing edges and
    /// similarities below the floor.
    pub fn add_pseudo_query_edges(
        &mut self,
        chunk_id: &str,
        targets: &[(String, f64)],
        min_score: f64,
    ) -> usize {
        let mut added = 0usize;
        for (target, score) in targets {
            if *score < min_score || target == chunk_id || !self.nodes.contains_key(target) {
                continue;
            }
            if self.edge(chunk_id, target).is_some() {
                continue;
            }
            if self.add_edge(
                chunk_id,
                target,
                PassageEdge { weight: WEIGHT_PSEUDO_FACTOR * score, kind: EdgeKind::PseudoQuery },
            ) {
                added += 1;
            }
        }
        added
    }

    /// Keep only each node's top-K pseudo-query edges by weight.
    ///
    /// Both endpoints vote and the union of votes is retained first; a
    /// final enforcement pass then trims the weakest pseudo-query edges of
    /// any node still above K, so no node ends with more than K of them.
    /// Returns the number of edges removed.
    pub fn prune_pseudo_query_edges(&mut self, max_per_node: usize) -> usize {
        let mut keep: HashSet<(String, String)> = HashSet::new();
        let mut all_pseudo: HashSet<(String, String)> = HashSet::new();

        for (node, edges) in &self.adjacency {
            let mut pseudo: Vec<(&String, f64)> = edges
                .iter()
                .filter(|(_, e)| matches!(e.kind, EdgeKind::PseudoQuery))
                .map(|(other, e)| (other, e.weight))
                .collect();
            for (other, _) in &pseudo {
                all_pseudo.insert(ordered_pair(node, other));
            }
            pseudo.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (other, _) in pseudo.into_iter().take(max_per_node) {
                keep.insert(ordered_pair(node, other));
            }
        }

        let mut removed = 0usize;
        for (a, b) in all_pseudo {
            if !keep.contains(&(a.clone(), b.clone())) {
                self.remove_edge_internal(&a, &b);
                removed += 1;
            }
        }

        // Cap enforcement: hub nodes voted in by many neighbors could still
        // exceed K
        let mut node_ids: Vec<String> = self.nodes.keys().cloned().collect();
        node_ids.sort();
        for node in node_ids {
            while self.pseudo_query_degree(&node) > max_per_node {
                let weakest = self
                    .adjacency
                    .get(&node)
                    .and_then(|edges| {
                        edges
                            .iter()
                            .filter(|(_, e)| matches!(e.kind, EdgeKind::PseudoQuery))
                            .min_by(|a, b| {
                                a.1.weight
                                    .partial_cmp(&b.1.weight)
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .map(|(other, _)| other.clone())
                    });
                match weakest {
                    Some(other) => {
                        self.remove_edge_internal(&node, &other);
                        removed += 1;
                    }
                    None => break,
                }
            }
        }

        info!(removed, "pseudo-query edges pruned");
        removed
    }

    /// Number of pseudo-query edges on one node.
    pub fn pseudo_query_degree(&self, chunk_id: &str) -> usize {
        self.adjacency
            .get(chunk_id)
            .map(|edges| {
                edges
                    .values()
                    .filter(|e| matches!(e.kind, EdgeKind::PseudoQuery))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Graph statistics.
    pub fn stats(&self) -> GraphStats {
        let mut edges_by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut counted: HashSet<(String, String)> = HashSet::new();
        let mut max_degree = 0usize;
        let mut degree_sum = 0usize;
        let mut isolated = 0usize;

        for node in self.nodes.keys() {
            let degree = self.adjacency.get(node).map(|edges| edges.len()).unwrap_or(0);
            degree_sum += degree;
            max_degree = max_degree.max(degree);
            if degree == 0 {
                isolated += 1;
            }
            if let Some(edges) = self.adjacency.get(node) {
                for (other, edge) in edges {
                    if counted.insert(ordered_pair(node, other)) {
                        *edges_by_type.entry(edge.kind.type_name().to_string()).or_default() += 1;
                    }
                }
            }
        }

        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edge_count,
            edges_by_type,
            avg_degree: if self.nodes.is_empty() {
                0.0
            } else {
                degree_sum as f64 / self.nodes.len() as f64
            },
            max_degree,
            isolated_nodes: isolated,
            connected_components: self.connected_components(),
        }
    }

    fn connected_components(&self) -> usize {
        let mut visited: HashSet<&String> = HashSet::new();
        let mut components = 0usize;
        for start in self.nodes.keys() {
            if visited.contains(start) {
                continue;
            }
            components += 1;
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if !visited.insert(node) {
                    continue;
                }
                if let Some(edges) = self.adjacency.get(node) {
                    for other in edges.keys() {
                        if !visited.contains(other) {
                            stack.push(other);
                        }
                    }
                }
            }
        }
        components
    }

    /// Persist the graph as one binary blob.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = bincode::serialize(self)
            .map_err(|e| FinloomError::Validation(format!("graph serialization: {e}")))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a graph persisted by [`Self::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        bincode::deserialize(&bytes)
            .map_err(|e| FinloomError::Validation(format!("graph deserialization: {e}")))
    }
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, accession: &str, section: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            accession_number: accession.to_string(),
            section_item: section.to_string(),
            section_title: section.to_string(),
            chunk_index: index,
            token_count: text.split_whitespace().count(),
            char_start: 0,
            char_end: text.len(),
            text: text.to_string(),
            contains_tables: false,
            contains_lists: false,
            contains_numbers: false,
            embedding: None,
        }
    }

    fn graph_with(chunks: &[(Chunk, &str, &str)]) -> PassageGraph {
        let mut graph = PassageGraph::new();
        for (c, ticker, date) in chunks {
            graph.add_chunk(c, ticker, &format!("{ticker} Inc."), date);
        }
        graph
    }

    #[test]
    fn test_same_filing_edges_exact_shape() {
        // C1(F, item_1, 0), C2(F, item_1, 1), C3(F, item_7, 0)
        let mut graph = graph_with(&[
            (chunk("c1", "F", "item_1", 0, "a"), "AAPL", "2024-11-01"),
            (chunk("c2", "F", "item_1", 1, "b"), "AAPL", "2024-11-01"),
            (chunk("c3", "F", "item_7", 0, "c"), "AAPL", "2024-11-01"),
        ]);
        let added = graph.build_same_filing_edges();
        assert_eq!(added, 2);

        let sequential = graph.edge("c1", "c2").unwrap();
        assert_eq!(sequential.weight, 0.8);
        assert_eq!(
            sequential.kind,
            EdgeKind::SameFiling { subtype: "sequential".to_string() }
        );

        let cross = graph.edge("c1", "c3").unwrap();
        assert_eq!(cross.weight, 0.5);
        assert_eq!(
            cross.kind,
            EdgeKind::SameFiling { subtype: "cross_section".to_string() }
        );

        assert!(graph.edge("c2", "c3").is_none());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_no_self_loops_and_simple_graph() {
        let mut graph = graph_with(&[
            (chunk("c1", "F", "item_1", 0, "a"), "AAPL", "2024-11-01"),
            (chunk("c2", "F", "item_1", 1, "b"), "AAPL", "2024-11-01"),
        ]);
        assert!(!graph.add_edge("c1", "c1", PassageEdge { weight: 0.9, kind: EdgeKind::PseudoQuery }));

        assert!(graph.add_edge(
            "c1",
            "c2",
            PassageEdge { weight: 0.5, kind: EdgeKind::SameFiling { subtype: "cross_section".into() } }
        ));
        // Lower weight does not replace
        assert!(!graph.add_edge("c1", "c2", PassageEdge { weight: 0.4, kind: EdgeKind::PseudoQuery }));
        // Higher weight replaces, count stays 1
        assert!(graph.add_edge("c1", "c2", PassageEdge { weight: 0.9, kind: EdgeKind::PseudoQuery }));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge("c1", "c2").unwrap().weight, 0.9);
    }

    #[test]
    fn test_entity_cooccurrence_cross_filing_only() {
        let mut graph = graph_with(&[
            // AAPL filing mentions Intel; INTC filing mentions... also Intel (own, suppressed)
            (chunk("a1", "FA", "item_1", 0, "we compete with Intel on chips"), "AAPL", "2023-11-01"),
            (chunk("a2", "FA", "item_1", 1, "more Intel mentions here"), "AAPL", "2023-11-01"),
            (chunk("m1", "FM", "item_1", 0, "Intel is a key competitor"), "MSFT", "2023-07-01"),
            (chunk("i1", "FI", "item_1", 0, "Intel designs processors"), "INTC", "2023-02-01"),
        ]);
        let added = graph.build_entity_cooccurrence_edges(5);

        // AAPL chunks link to the MSFT chunk via the INTC entity; the INTC
        // chunk's own-company mention is suppressed
        assert!(graph.edge("a1", "m1").is_some());
        assert!(graph.edge("a2", "m1").is_some());
        assert!(graph.edge("a1", "i1").is_none());
        assert!(graph.edge("i1", "m1").is_none());
        assert_eq!(added, 2);

        let edge = graph.edge("a1", "m1").unwrap();
        assert_eq!(edge.weight, 0.6);
        assert_eq!(edge.kind, EdgeKind::EntityCooccurrence { entity: "INTC".to_string() });
    }

    #[test]
    fn test_temporal_alignment() {
        let mut graph = graph_with(&[
            (chunk("y1c0", "F23", "item_1a", 0, "a"), "AAPL", "2023-11-03"),
            (chunk("y1c1", "F23", "item_1a", 1, "b"), "AAPL", "2023-11-03"),
            (chunk("y2c0", "F24", "item_1a", 0, "c"), "AAPL", "2024-11-01"),
            // Different section: no temporal link
            (chunk("y2x", "F24", "item_7", 0, "d"), "AAPL", "2024-11-01"),
        ]);
        let added = graph.build_temporal_edges();
        assert_eq!(added, 1);

        let edge = graph.edge("y1c0", "y2c0").unwrap();
        assert_eq!(edge.weight, 0.7);
        assert_eq!(edge.kind, EdgeKind::Temporal { year_from: 2023, year_to: 2024 });
        assert!(graph.edge("y1c1", "y2c0").is_none()); // positional alignment only
    }

    #[test]
    fn test_temporal_gap_beyond_two_years_skipped() {
        let mut graph = graph_with(&[
            (chunk("old", "F20", "item_1a", 0, "a"), "AAPL", "2020-10-30"),
            (chunk("new", "F24", "item_1a", 0, "b"), "AAPL", "2024-11-01"),
        ]);
        assert_eq!(graph.build_temporal_edges(), 0);
    }

    #[test]
    fn test_pseudo_query_edges_and_pruning() {
        let chunks: Vec<(Chunk, &str, &str)> = (0..8)
            .map(|i| (chunk(&format!("c{i}"), "F", "item_1", i, "text"), "AAPL", "2024-11-01"))
            .collect::<Vec<_>>()
            .iter()
            .map(|(c, t, d)| (c.clone(), *t, *d))
            .collect();
        let mut graph = graph_with(&chunks);

        // c0 links to many targets with varying similarity
        let targets: Vec<(String, f64)> = (1..8).map(|i| (format!("c{i}"), 0.5 + 0.05 * i as f64)).collect();
        let added = graph.add_pseudo_query_edges("c0", &targets, 0.60);
        // 0.55 and below filtered out: targets c1 (0.55) fails, c2..c7 pass
        assert_eq!(added, 6);
        let weight = graph.edge("c0", "c7").unwrap().weight;
        assert!((weight - 0.9 * 0.85).abs() < 1e-9);

        let removed = graph.prune_pseudo_query_edges(3);
        assert!(removed > 0);
        assert!(graph.pseudo_query_degree("c0") <= 3);

        // Invariant: no node exceeds K after pruning
        for i in 0..8 {
            assert!(graph.pseudo_query_degree(&format!("c{i}")) <= 3);
        }
    }

    #[test]
    fn test_pruning_cap_holds_even_for_voted_in_edges() {
        // Leaves vote their only edge in, but the hub cap still applies
        let mut graph = graph_with(&[
            (chunk("hub", "F", "item_1", 0, "a"), "AAPL", "2024-11-01"),
            (chunk("s1", "F1", "item_1", 0, "b"), "AAPL", "2023-11-01"),
            (chunk("s2", "F2", "item_1", 0, "c"), "AAPL", "2022-11-01"),
            (chunk("s3", "F3", "item_1", 0, "d"), "AAPL", "2021-11-01"),
        ]);
        graph.add_pseudo_query_edges(
            "hub",
            &[("s1".to_string(), 0.99), ("s2".to_string(), 0.95), ("s3".to_string(), 0.61)],
            0.6,
        );

        let removed = graph.prune_pseudo_query_edges(2);
        assert_eq!(removed, 1);
        assert_eq!(graph.pseudo_query_degree("hub"), 2);
        // The weakest edge went
        assert!(graph.edge("hub", "s3").is_none());
        assert!(graph.edge("hub", "s1").is_some());
        assert!(graph.edge("hub", "s2").is_some());
    }

    #[test]
    fn test_stats() {
        let mut graph = graph_with(&[
            (chunk("c1", "F", "item_1", 0, "a"), "AAPL", "2024-11-01"),
            (chunk("c2", "F", "item_1", 1, "b"), "AAPL", "2024-11-01"),
            (chunk("iso", "G", "item_7", 0, "c"), "MSFT", "2024-07-01"),
        ]);
        graph.build_same_filing_edges();

        let stats = graph.stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.edges_by_type.get("same_filing"), Some(&1));
        assert_eq!(stats.isolated_nodes, 1);
        assert_eq!(stats.connected_components, 2);
        assert_eq!(stats.max_degree, 1);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passage_graph.bin");

        let mut graph = graph_with(&[
            (chunk("c1", "F", "item_1", 0, "a"), "AAPL", "2024-11-01"),
            (chunk("c2", "F", "item_1", 1, "b"), "AAPL", "2024-11-01"),
        ]);
        graph.build_same_filing_edges();
        graph.save(&path).unwrap();

        let loaded = PassageGraph::load(&path).unwrap();
        assert_eq!(loaded.node_count(), 2);
        assert_eq!(loaded.edge_count(), 1);
        assert_eq!(loaded.edge("c1", "c2").unwrap().weight, 0.8);
        assert_eq!(loaded.node("c1").unwrap().ticker, "AAPL");
    }
}
