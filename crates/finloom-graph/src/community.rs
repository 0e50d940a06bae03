//! Community detection and LLM summarization over the knowledge graph.
//!
//! Detection runs seeded label propagation over the undirected projection
//! of the graph (direction semantics are lost by design of the
//! projection). A fixed seed keeps runs reproducible. Communities above
//! the membership floor get a structured LLM summary persisted onto every
//! member node; summarization failures leave a placeholder instead.

use crate::property::PropertyGraph;
use finloom::error::Result;
use finloom_llm::ChatClient;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

const MAX_ITERATIONS: usize = 20;
const MAX_MEMBERS_IN_PROMPT: usize = 100;

/// Structured community summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunitySummary {
    /// Short title
    pub title: String,
    /// Two-to-three sentence description
    pub description: String,
    /// Themes covered by the community
    #[serde(default)]
    pub themes: Vec<String>,
    /// Time period the community spans
    #[serde(default)]
    pub time_period: Option<String>,
    /// Companies involved
    #[serde(default)]
    pub companies: Vec<String>,
    /// Member node count
    #[serde(default)]
    pub member_count: usize,
}

/// Result of one detection run.
#[derive(Debug, Clone)]
pub struct CommunityAssignment {
    /// Node id -> community id
    pub membership: HashMap<i64, usize>,
    /// Distinct community count
    pub community_count: usize,
    /// Iterations until convergence
    pub iterations: usize,
}

/// Seeded label propagation over the undirected projection.
///
/// Every node starts in its own community; each sweep reassigns nodes to
/// their neighborhood's dominant label. Node order is shuffled once per
/// sweep from the seed, so identical inputs give identical communities.
pub fn detect_communities(graph: &PropertyGraph, seed: u64) -> Result<CommunityAssignment> {
    let nodes = graph.all_nodes()?;
    let edges = graph.undirected_edges()?;

    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for (a, b) in &edges {
        if a != b {
            adjacency.entry(*a).or_default().push(*b);
            adjacency.entry(*b).or_default().push(*a);
        }
    }

    let mut labels: HashMap<i64, usize> =
        nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut order: Vec<i64> = nodes.iter().map(|n| n.id).collect();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut iterations = 0;
    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        order.shuffle(&mut rng);
        let mut changed = false;

        for node in &order {
            let Some(neighbors) = adjacency.get(node) else {
                continue;
            };
            // Dominant neighbor label; ties break on the smaller label for
            // determinism
            let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
            for neighbor in neighbors {
                if let Some(label) = labels.get(neighbor) {
                    *counts.entry(*label).or_default() += 1;
                }
            }
            if let Some((&best_label, _)) = counts.iter().max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0))) {
                if labels.get(node) != Some(&best_label) {
                    labels.insert(*node, best_label);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    // Renumber to dense ids
    let mut dense: HashMap<usize, usize> = HashMap::new();
    let mut membership: HashMap<i64, usize> = HashMap::new();
    for node in &nodes {
        let raw = labels[&node.id];
        let next_id = dense.len();
        let dense_id = *dense.entry(raw).or_insert(next_id);
        membership.insert(node.id, dense_id);
    }

    let community_count = dense.len();
    info!(communities = community_count, iterations, "community detection complete");
    Ok(CommunityAssignment { membership, community_count, iterations })
}

/// Persist community membership as a node property.
pub fn write_membership(graph: &PropertyGraph, assignment: &CommunityAssignment) -> Result<()> {
    for (node_id, community) in &assignment.membership {
        graph.set_node_property(*node_id, "community", json!(community))?;
    }
    Ok(())
}

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize clusters of financial entities \
from annual filings. Given member nodes and relationship-type counts, respond with JSON: \
{\"title\": str, \"description\": \"2-3 sentences\", \"themes\": [str], \
\"time_period\": str|null, \"companies\": [str]}";

/// Summarize every community with at least `min_members` members and
/// persist each summary onto its member nodes.
pub async fn summarize_communities(
    graph: &PropertyGraph,
    chat: &ChatClient,
    assignment: &CommunityAssignment,
    min_members: usize,
) -> Result<Vec<CommunitySummary>> {
    let mut by_community: BTreeMap<usize, Vec<i64>> = BTreeMap::new();
    for (node_id, community) in &assignment.membership {
        by_community.entry(*community).or_default().push(*node_id);
    }

    let mut summaries = Vec::new();
    for (community_id, mut members) in by_community {
        if members.len() < min_members {
            continue;
        }
        members.sort_unstable();

        let mut summary = match summarize_one(graph, chat, community_id, &members).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(community = community_id, error = %e, "community summary failed");
                CommunitySummary {
                    title: format!("Community {community_id}"),
                    description: format!("Summary generation failed: {e}"),
                    ..Default::default()
                }
            }
        };
        summary.member_count = members.len();

        let summary_json = serde_json::to_value(&summary)?;
        for member in &members {
            graph.set_node_property(*member, "community_summary", summary_json.clone())?;
        }
        summaries.push(summary);
    }
    Ok(summaries)
}

async fn summarize_one(
    graph: &PropertyGraph,
    chat: &ChatClient,
    community_id: usize,
    members: &[i64],
) -> Result<CommunitySummary> {
    let mut lines = Vec::new();
    for member in members.iter().take(MAX_MEMBERS_IN_PROMPT) {
        if let Some(node) = graph.get_node_by_id(*member)? {
            let name = node
                .properties
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&node.key);
            lines.push(format!("- [{}] {}", node.label, name));
        }
    }
    let rel_counts = graph.relationship_type_counts(&members[..members.len().min(MAX_MEMBERS_IN_PROMPT)])?;
    let rel_lines: Vec<String> = rel_counts
        .iter()
        .take(10)
        .map(|(rel_type, count)| format!("  - {rel_type}: {count}"))
        .collect();

    let prompt = format!(
        "Community {community_id} ({} members):\n{}\n\nRelationship types:\n{}",
        members.len(),
        lines.join("\n"),
        rel_lines.join("\n"),
    );
    chat.complete_json::<CommunitySummary>(SUMMARY_SYSTEM_PROMPT, &prompt).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{labels, RelationshipSpec, rels};

    fn two_cluster_graph() -> PropertyGraph {
        let graph = PropertyGraph::in_memory().unwrap();
        // Cluster A: company with 3 filings, Cluster B: company with 2
        let a = graph.upsert_node(labels::COMPANY, "a", json!({"name": "A"})).unwrap();
        let b = graph.upsert_node(labels::COMPANY, "b", json!({"name": "B"})).unwrap();
        for i in 0..3 {
            let f = graph.upsert_node(labels::FILING, &format!("a-{i}"), json!({})).unwrap();
            graph
                .create_relationship(&RelationshipSpec {
                    from_id: a,
                    to_id: f,
                    rel_type: rels::FILED.to_string(),
                    properties: json!({}),
                })
                .unwrap();
        }
        for i in 0..2 {
            let f = graph.upsert_node(labels::FILING, &format!("b-{i}"), json!({})).unwrap();
            graph
                .create_relationship(&RelationshipSpec {
                    from_id: b,
                    to_id: f,
                    rel_type: rels::FILED.to_string(),
                    properties: json!({}),
                })
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_detects_disconnected_clusters() {
        let graph = two_cluster_graph();
        let assignment = detect_communities(&graph, 42).unwrap();

        // The two stars must land in different communities
        let a = graph.get_node(labels::COMPANY, "a").unwrap().unwrap();
        let b = graph.get_node(labels::COMPANY, "b").unwrap().unwrap();
        assert_ne!(assignment.membership[&a.id], assignment.membership[&b.id]);

        // Filings join their company's community
        let f = graph.get_node(labels::FILING, "a-0").unwrap().unwrap();
        assert_eq!(assignment.membership[&a.id], assignment.membership[&f.id]);
    }

    #[test]
    fn test_detection_is_reproducible() {
        let graph = two_cluster_graph();
        let first = detect_communities(&graph, 42).unwrap();
        let second = detect_communities(&graph, 42).unwrap();
        assert_eq!(first.membership, second.membership);
    }

    #[test]
    fn test_write_membership() {
        let graph = two_cluster_graph();
        let assignment = detect_communities(&graph, 42).unwrap();
        write_membership(&graph, &assignment).unwrap();

        let a = graph.get_node(labels::COMPANY, "a").unwrap().unwrap();
        assert!(a.properties.get("community").is_some());
    }
}
