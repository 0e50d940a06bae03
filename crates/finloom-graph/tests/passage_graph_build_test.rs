//! Integration test: full passage-graph build over a small corpus.

use finloom::types::Chunk;
use finloom_graph::PassageGraph;

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

fn build_corpus() -> PassageGraph {
    let mut graph = PassageGraph::new();

    // Two AAPL 10-Ks in consecutive years plus one MSFT filing
    for (id, acc, section, index, ticker, date, text) in [
        ("a23-0", "A23", "item_1a", 0, "AAPL", "2023-11-03", "supply risks and Intel competition"),
        ("a23-1", "A23", "item_1a", 1, "AAPL", "2023-11-03", "regulatory exposure remains"),
        ("a23-7", "A23", "item_7", 0, "AAPL", "2023-11-03", "revenue grew modestly"),
        ("a24-0", "A24", "item_1a", 0, "AAPL", "2024-11-01", "supply risks persisted this year"),
        ("a24-7", "A24", "item_7", 0, "AAPL", "2024-11-01", "services drove growth"),
        ("m23-0", "M23", "item_1a", 0, "MSFT", "2023-07-27", "cloud competition including Intel chips"),
    ] {
        graph.add_chunk(&chunk(id, acc, section, index, text), ticker, &format!("{ticker} Inc."), date);
    }

    graph.build_same_filing_edges();
    graph.build_entity_cooccurrence_edges(5);
    graph.build_temporal_edges();
    graph
}

#[test]
fn test_all_edge_types_present() {
    let graph = build_corpus();
    let stats = graph.stats();

    assert_eq!(stats.node_count, 6);
    assert!(stats.edges_by_type.contains_key("same_filing"));
    assert!(stats.edges_by_type.contains_key("entity_cooccurrence"));
    assert!(stats.edges_by_type.contains_key("temporal"));
}

#[test]
fn test_edge_invariants_hold() {
    let mut graph = build_corpus();
    graph.add_pseudo_query_edges(
        "a23-7",
        &[("m23-0".to_string(), 0.9), ("a23-7".to_string(), 0.99)],
        0.6,
    );
    graph.prune_pseudo_query_edges(10);

    // No self-loop was admitted
    assert!(graph.edge("a23-7", "a23-7").is_none());

    // Every node stays within the pseudo-query cap
    for id in ["a23-0", "a23-1", "a23-7", "a24-0", "a24-7", "m23-0"] {
        assert!(graph.pseudo_query_degree(id) <= 10);
    }
}

#[test]
fn test_temporal_links_consecutive_years() {
    let graph = build_corpus();
    // item_1a position 0 aligns across 2023 -> 2024
    let edge = graph.edge("a23-0", "a24-0").expect("temporal edge");
    assert_eq!(edge.weight, 0.7);
}

#[test]
fn test_entity_cooccurrence_links_across_companies() {
    let graph = build_corpus();
    // Both mention Intel, different filings, neither is INTC itself
    assert!(graph.edge("a23-0", "m23-0").is_some());
}

#[test]
fn test_save_load_preserves_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("passage_graph.bin");

    let graph = build_corpus();
    let before = graph.stats();
    graph.save(&path).unwrap();

    let loaded = PassageGraph::load(&path).unwrap();
    let after = loaded.stats();
    assert_eq!(before.node_count, after.node_count);
    assert_eq!(before.edge_count, after.edge_count);
    assert_eq!(before.edges_by_type, after.edges_by_type);
}
