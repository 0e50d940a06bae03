//! Knowledge-graph search primitive.
//!
//! For a company entity: risk factors carry the largest share of slots,
//! filing community summaries come second, and executives keep a small
//! guaranteed share so no category crowds out the others.

use finloom::error::Result;
use finloom::types::{HitMetadata, SearchHit};
use finloom_graph::property::{GraphNode, PropertyGraph, labels, rels};
use tracing::warn;

const EXECUTIVE_LIMIT: usize = 5;
const SUMMARY_SCORE: f64 = 0.7;
const EXECUTIVE_SCORE: f64 = 0.6;

/// Search facade over the knowledge graph.
#[derive(Debug)]
pub struct GraphSearch<'a> {
    graph: &'a PropertyGraph,
}

impl<'a> GraphSearch<'a> {
    /// Facade over an open graph.
    pub const fn new(graph: &'a PropertyGraph) -> Self {
        Self { graph }
    }

    /// Content related to an entity (ticker or company name).
    pub fn search_by_entity(&self, entity: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let Some(company) = self.find_company(entity)? else {
            return Ok(Vec::new());
        };

        let executives = self.query_executives(&company, EXECUTIVE_LIMIT)?;
        let summaries = self.query_filing_summaries(&company, top_k.min(5))?;

        let reserved = executives.len() + summaries.len();
        let risk_budget = (top_k.saturating_sub(reserved)).max(top_k / 2);
        let risks = self.query_risk_factors(&company, risk_budget)?;

        let mut results = risks;
        results.extend(summaries);
        results.extend(executives);
        results.truncate(top_k);
        Ok(results)
    }

    fn find_company(&self, entity: &str) -> Result<Option<GraphNode>> {
        let entity_lower = entity.to_lowercase();
        let companies = self.graph.nodes_by_label(labels::COMPANY)?;
        Ok(companies.into_iter().find(|node| {
            let ticker = node.properties.get("ticker").and_then(|v| v.as_str()).unwrap_or("");
            let name = node.properties.get("name").and_then(|v| v.as_str()).unwrap_or(&node.key);
            ticker.eq_ignore_ascii_case(entity) || name.to_lowercase().contains(&entity_lower)
        }))
    }

    fn company_meta(&self, company: &GraphNode) -> (Option<String>, Option<String>) {
        (
            company.properties.get("ticker").and_then(|v| v.as_str()).map(str::to_string),
            company.properties.get("name").and_then(|v| v.as_str()).map(str::to_string),
        )
    }

    fn filings_of(&self, company: &GraphNode) -> Result<Vec<GraphNode>> {
        let mut filings = Vec::new();
        for (filing_id, _) in self.graph.neighbors(company.id, Some(rels::FILED))? {
            if let Some(filing) = self.graph.get_node_by_id(filing_id)? {
                filings.push(filing);
            }
        }
        // Newest filings first
        filings.sort_by(|a, b| {
            let date = |n: &GraphNode| {
                n.properties
                    .get("filing_date")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            date(b).cmp(&date(a))
        });
        Ok(filings)
    }

    fn query_risk_factors(&self, company: &GraphNode, limit: usize) -> Result<Vec<SearchHit>> {
        let (ticker, name) = self.company_meta(company);
        let mut hits = Vec::new();

        for filing in self.filings_of(company)? {
            let filing_date = filing
                .properties
                .get("filing_date")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            for (risk_id, _) in self.graph.neighbors(filing.id, Some(rels::DISCLOSES_RISK))? {
                let Some(risk) = self.graph.get_node_by_id(risk_id)? else {
                    continue;
                };
                let category = risk
                    .properties
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&risk.key)
                    .to_string();
                let description = risk
                    .properties
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&category)
                    .to_string();
                let severity = risk
                    .properties
                    .get("severity")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(3.0);

                hits.push(SearchHit {
                    key: format!("graph_risk_{}", risk.id),
                    content: description,
                    score: (severity / 5.0).min(1.0),
                    metadata: HitMetadata {
                        chunk_id: None,
                        ticker: ticker.clone(),
                        company_name: name.clone(),
                        section_item: Some(format!("risk_factor ({category})")),
                        section_title: Some("Risk Factors".to_string()),
                        filing_date: filing_date.clone(),
                        accession_number: filing
                            .properties
                            .get("accession_number")
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                        fiscal_year: None,
                        sources: vec!["graph".to_string()],
                        hop_number: 0,
                        edge_type: None,
                    },
                });
                if hits.len() >= limit {
                    return Ok(hits);
                }
            }
        }
        Ok(hits)
    }

    fn query_filing_summaries(&self, company: &GraphNode, limit: usize) -> Result<Vec<SearchHit>> {
        let (ticker, name) = self.company_meta(company);
        let mut hits = Vec::new();

        for filing in self.filings_of(company)? {
            let Some(summary) = filing.properties.get("community_summary") else {
                continue;
            };
            let description = summary
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if description.is_empty() {
                continue;
            }
            hits.push(SearchHit {
                key: format!("graph_summary_{}", filing.id),
                content: description,
                score: SUMMARY_SCORE,
                metadata: HitMetadata {
                    chunk_id: None,
                    ticker: ticker.clone(),
                    company_name: name.clone(),
                    section_item: Some("community_summary".to_string()),
                    section_title: summary
                        .get("title")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    filing_date: filing
                        .properties
                        .get("filing_date")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    accession_number: filing
                        .properties
                        .get("accession_number")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    fiscal_year: None,
                    sources: vec!["graph".to_string()],
                    hop_number: 0,
                    edge_type: None,
                },
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }

    fn query_executives(&self, company: &GraphNode, limit: usize) -> Result<Vec<SearchHit>> {
        let (ticker, name) = self.company_meta(company);
        let mut hits = Vec::new();

        for (person_id, _) in self.graph.neighbors(company.id, Some(rels::HAS_EXECUTIVE))? {
            let Some(person) = self.graph.get_node_by_id(person_id)? else {
                continue;
            };
            let person_name = person
                .properties
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&person.key)
                .to_string();
            let role = person
                .properties
                .get("role")
                .and_then(|v| v.as_str())
                .unwrap_or("Executive")
                .to_string();

            hits.push(SearchHit {
                key: format!("graph_person_{}", person.id),
                content: format!("{person_name} serves as {role}."),
                score: EXECUTIVE_SCORE,
                metadata: HitMetadata {
                    chunk_id: None,
                    ticker: ticker.clone(),
                    company_name: name.clone(),
                    section_item: Some("executive".to_string()),
                    section_title: Some(role),
                    filing_date: None,
                    accession_number: None,
                    fiscal_year: None,
                    sources: vec!["graph".to_string()],
                    hop_number: 0,
                    edge_type: None,
                },
            });
            if hits.len() >= limit {
                break;
            }
        }
        Ok(hits)
    }
}

/// Non-fatal wrapper used by hybrid search: graph unavailability degrades
/// to an empty result with a warning.
pub fn search_entity_lenient(graph: &PropertyGraph, entity: &str, top_k: usize) -> Vec<SearchHit> {
    match GraphSearch::new(graph).search_by_entity(entity, top_k) {
        Ok(hits) => hits,
        Err(e) => {
            warn!(entity, error = %e, "graph search failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finloom_graph::RelationshipSpec;
    use serde_json::json;

    fn seeded_graph() -> PropertyGraph {
        let graph = PropertyGraph::in_memory().unwrap();
        let company = graph
            .upsert_node(labels::COMPANY, "0000320193", json!({"ticker": "AAPL", "name": "Apple Inc."}))
            .unwrap();
        let filing = graph
            .upsert_node(
                labels::FILING,
                "acc-1",
                json!({
                    "accession_number": "acc-1",
                    "filing_date": "2024-11-01",
                    "community_summary": {"title": "Consumer tech", "description": "Cluster of consumer hardware filings."},
                }),
            )
            .unwrap();
        graph
            .create_relationship(&RelationshipSpec {
                from_id: company,
                to_id: filing,
                rel_type: rels::FILED.to_string(),
                properties: json!({}),
            })
            .unwrap();

        for (i, severity) in [(0, 5), (1, 2)] {
            let risk = graph
                .upsert_node(
                    labels::RISK_FACTOR,
                    &format!("risk-{i}"),
                    json!({"name": format!("Risk {i}"), "description": format!("Description {i}"), "severity": severity}),
                )
                .unwrap();
            graph
                .create_relationship(&RelationshipSpec {
                    from_id: filing,
                    to_id: risk,
                    rel_type: rels::DISCLOSES_RISK.to_string(),
                    properties: json!({}),
                })
                .unwrap();
        }

        let person = graph
            .upsert_node(labels::PERSON, "timothy d. cook", json!({"name": "Timothy D. Cook", "role": "Chief Executive Officer"}))
            .unwrap();
        graph
            .create_relationship(&RelationshipSpec {
                from_id: company,
                to_id: person,
                rel_type: rels::HAS_EXECUTIVE.to_string(),
                properties: json!({}),
            })
            .unwrap();

        graph
    }

    #[test]
    fn test_entity_search_covers_all_categories() {
        let graph = seeded_graph();
        let search = GraphSearch::new(&graph);

        let hits = search.search_by_entity("AAPL", 10).unwrap();
        let sections: Vec<&str> = hits
            .iter()
            .filter_map(|h| h.metadata.section_item.as_deref())
            .collect();

        assert!(sections.iter().any(|s| s.starts_with("risk_factor")));
        assert!(sections.contains(&"community_summary"));
        assert!(sections.contains(&"executive"));
        // Risks come first
        assert!(hits[0].metadata.section_item.as_deref().unwrap().starts_with("risk_factor"));
    }

    #[test]
    fn test_lookup_by_name() {
        let graph = seeded_graph();
        let search = GraphSearch::new(&graph);
        let hits = search.search_by_entity("Apple", 10).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_unknown_entity_empty() {
        let graph = seeded_graph();
        let search = GraphSearch::new(&graph);
        assert!(search.search_by_entity("ZZZZ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_risk_score_from_severity() {
        let graph = seeded_graph();
        let hits = GraphSearch::new(&graph).search_by_entity("AAPL", 10).unwrap();
        let top_risk = hits
            .iter()
            .find(|h| h.metadata.section_item.as_deref().unwrap_or("").starts_with("risk_factor"))
            .unwrap();
        assert!(top_risk.score <= 1.0 && top_risk.score > 0.0);
    }
}
