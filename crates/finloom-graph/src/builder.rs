//! Knowledge-graph construction from parsed entities and stored facts.

use crate::property::{GraphNode, PropertyGraph, RelationshipSpec, labels, rels};
use finloom::error::Result;
use finloom::types::{Company, FactValue, Filing};
use finloom_parse::entities::{EntityLabel, SectionEntities};
use finloom_store::Store;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

/// Fuzzy-match floor for merging entity names onto existing nodes.
const FUZZY_MATCH_THRESHOLD: f64 = 90.0;

/// Key reported concepts imported by default.
pub const KEY_CONCEPTS: &[&str] = &[
    "us-gaap:Revenues",
    "us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax",
    "us-gaap:NetIncomeLoss",
    "us-gaap:Assets",
    "us-gaap:Liabilities",
    "us-gaap:StockholdersEquity",
    "us-gaap:EarningsPerShareBasic",
    "us-gaap:EarningsPerShareDiluted",
    "us-gaap:OperatingIncomeLoss",
    "us-gaap:CashAndCashEquivalentsAtCarryingValue",
];

/// Token-set similarity in [0, 100]: unique sorted tokens compared with
/// normalized Levenshtein, so word order and repetition stop mattering.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let normalize = |s: &str| -> String {
        let mut tokens: Vec<String> = s
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens.join(" ")
    };
    strsim::normalized_levenshtein(&normalize(a), &normalize(b)) * 100.0
}

/// Builds the knowledge graph from entity JSON and XBRL facts.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    graph: &'a PropertyGraph,
}

/// Statistics from one build pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Nodes created or merged
    pub nodes: usize,
    /// Relationships written
    pub relationships: usize,
}

impl<'a> GraphBuilder<'a> {
    /// Builder over an open graph store.
    pub const fn new(graph: &'a PropertyGraph) -> Self {
        Self { graph }
    }

    /// Deterministic company + filing upsert with the `FILED` edge.
    pub fn upsert_filing(&self, company: &Company, filing: &Filing) -> Result<(i64, i64)> {
        let company_id = self.graph.upsert_node(
            labels::COMPANY,
            &company.cik,
            json!({
                "cik": company.cik,
                "name": company.name,
                "ticker": company.ticker,
                "sic_code": company.sic_code,
            }),
        )?;
        let filing_id = self.graph.upsert_node(
            labels::FILING,
            &filing.accession_number,
            json!({
                "accession_number": filing.accession_number,
                "form_type": filing.form_type,
                "filing_date": filing.filing_date.format("%Y-%m-%d").to_string(),
                "cik": filing.cik,
            }),
        )?;
        self.graph.create_relationship(&RelationshipSpec {
            from_id: company_id,
            to_id: filing_id,
            rel_type: rels::FILED.to_string(),
            properties: json!({"filing_date": filing.filing_date.format("%Y-%m-%d").to_string()}),
        })?;
        Ok((company_id, filing_id))
    }

    /// Import one section's entities: match-or-create nodes, then batch
    /// the mention relationships at the filing boundary.
    pub fn import_section_entities(
        &self,
        company_id: i64,
        filing_id: i64,
        section: &SectionEntities,
    ) -> Result<BuildStats> {
        let mut stats = BuildStats::default();
        let mut specs: Vec<RelationshipSpec> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for entity in &section.raw_entities {
            let (label, rel_type) = match entity.label {
                EntityLabel::Person => (labels::PERSON, rels::MENTIONS_PERSON),
                EntityLabel::Org => (labels::COMPANY, rels::MENTIONS_COMPANY),
                EntityLabel::Metric => (labels::FINANCIAL_METRIC, rels::MENTIONS_METRIC),
                EntityLabel::Risk => (labels::RISK_FACTOR, rels::MENTIONS_RISK),
                EntityLabel::Gpe => (labels::EVENT, rels::MENTIONS_LOCATION),
                // Amounts, dates and bare numbers stay in the store, not the graph
                EntityLabel::Money | EntityLabel::Date | EntityLabel::Cardinal => continue,
            };
            if !seen.insert((label.to_string(), entity.text.to_lowercase())) {
                continue;
            }

            let node_id = self.match_or_create(label, &entity.text)?;
            stats.nodes += 1;
            specs.push(RelationshipSpec {
                from_id: filing_id,
                to_id: node_id,
                rel_type: rel_type.to_string(),
                properties: json!({"section": section.section_type}),
            });
        }

        if let Some(extraction) = &section.llm_extraction {
            for person in &extraction.people {
                let node_id = self.match_or_create(labels::PERSON, &person.name)?;
                self.graph.set_node_property(node_id, "role", json!(person.role))?;
                stats.nodes += 1;
                specs.push(RelationshipSpec {
                    from_id: company_id,
                    to_id: node_id,
                    rel_type: rels::HAS_EXECUTIVE.to_string(),
                    properties: json!({
                        "role": person.role,
                        "start_date": person.start_date,
                    }),
                });
            }
            for risk in &extraction.risk_factors {
                let node_id = self.match_or_create(labels::RISK_FACTOR, &risk.category)?;
                stats.nodes += 1;
                specs.push(RelationshipSpec {
                    from_id: filing_id,
                    to_id: node_id,
                    rel_type: rels::DISCLOSES_RISK.to_string(),
                    properties: json!({
                        "severity": risk.severity,
                        "description": risk.description,
                        "section": section.section_type,
                    }),
                });
            }
        }

        stats.relationships = self.graph.batch_relationships(&specs)?;
        debug!(section = %section.section_type, nodes = stats.nodes, rels = stats.relationships, "section entities imported");
        Ok(stats)
    }

    /// Exact case-insensitive match first, then fuzzy token-set match at
    /// the threshold; otherwise create a new node.
    fn match_or_create(&self, label: &str, name: &str) -> Result<i64> {
        let key = name.trim().to_lowercase();
        if let Some(node) = self.graph.get_node(label, &key)? {
            return Ok(node.id);
        }

        // Person and Company names vary across filings; merge close forms
        if matches!(label, labels::PERSON | labels::COMPANY) {
            let candidates = self.graph.nodes_by_label(label)?;
            if let Some(best) = best_fuzzy_match(&candidates, name) {
                return Ok(best);
            }
        }

        self.graph.upsert_node(label, &key, json!({"name": name.trim()}))
    }

    /// Import stored facts as `FinancialMetric` nodes with
    /// `REPORTS_METRIC` edges, in batches.
    pub fn import_xbrl_facts(
        &self,
        store: &Store,
        accession: &str,
        filing_id: i64,
        key_concepts_only: bool,
    ) -> Result<BuildStats> {
        let mut stats = BuildStats::default();
        let mut specs = Vec::new();

        let facts = store.facts().get(accession, None)?;
        for fact in &facts {
            if key_concepts_only && !KEY_CONCEPTS.contains(&fact.concept_qname.as_str()) {
                continue;
            }
            let FactValue::Numeric(value) = fact.value else {
                continue;
            };
            if fact.dimensions.is_some() {
                continue;
            }

            let metric_key = format!(
                "{}|{}|{}",
                accession,
                fact.concept_qname,
                fact.period_end.map(|d| d.to_string()).unwrap_or_default()
            );
            let node_id = self.graph.upsert_node(
                labels::FINANCIAL_METRIC,
                &metric_key,
                json!({
                    "concept": fact.concept_qname,
                    "value": value,
                    "unit": fact.unit,
                    "period_start": fact.period_start.map(|d| d.to_string()),
                    "period_end": fact.period_end.map(|d| d.to_string()),
                }),
            )?;
            stats.nodes += 1;
            specs.push(RelationshipSpec {
                from_id: filing_id,
                to_id: node_id,
                rel_type: rels::REPORTS_METRIC.to_string(),
                properties: json!({"concept": fact.concept_qname}),
            });
        }

        stats.relationships = self.graph.batch_relationships(&specs)?;
        info!(accession, metrics = stats.nodes, "XBRL facts imported into graph");
        Ok(stats)
    }
}

fn best_fuzzy_match(candidates: &[GraphNode], name: &str) -> Option<i64> {
    let mut best: Option<(i64, f64)> = None;
    for candidate in candidates {
        let candidate_name = candidate
            .properties
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&candidate.key);
        let score = token_set_ratio(candidate_name, name);
        if score >= FUZZY_MATCH_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate.id, score));
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finloom::types::DownloadStatus;
    use finloom_parse::entities::{ExecutivePerson, ExtractedEntity, LlmExtraction, RiskFactor};
    use rstest::rstest;

    #[rstest]
    #[case("Timothy D. Cook", "Timothy D. Cook", 100.0)]
    #[case("Cook Timothy D.", "Timothy D. Cook", 100.0)] // order-insensitive
    #[case("Apple", "Microsoft", 40.0)]
    fn test_token_set_ratio(#[case] a: &str, #[case] b: &str, #[case] at_least_or_below: f64) {
        let score = token_set_ratio(a, b);
        if at_least_or_below >= 90.0 {
            assert!(score >= at_least_or_below - 1e-9, "{a} vs {b}: {score}");
        } else {
            assert!(score < at_least_or_below, "{a} vs {b}: {score}");
        }
    }

    fn company() -> Company {
        Company {
            cik: "0000320193".to_string(),
            name: "Apple Inc.".to_string(),
            ticker: Some("AAPL".to_string()),
            sic_code: None,
            sic_description: None,
            state_of_incorporation: None,
            fiscal_year_end: None,
            ein: None,
        }
    }

    fn filing() -> Filing {
        Filing {
            accession_number: "acc-1".to_string(),
            cik: "0000320193".to_string(),
            form_type: "10-K".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            period_of_report: None,
            acceptance_datetime: None,
            primary_document: None,
            primary_doc_description: None,
            is_xbrl: true,
            is_inline_xbrl: true,
            local_path: None,
            download_status: DownloadStatus::Completed,
            xbrl_processed: true,
            sections_processed: true,
            full_markdown: None,
        }
    }

    #[test]
    fn test_upsert_filing_idempotent() {
        let graph = PropertyGraph::in_memory().unwrap();
        let builder = GraphBuilder::new(&graph);

        let (c1, f1) = builder.upsert_filing(&company(), &filing()).unwrap();
        let (c2, f2) = builder.upsert_filing(&company(), &filing()).unwrap();
        assert_eq!((c1, f1), (c2, f2));

        let (nodes, relationships) = graph.counts().unwrap();
        assert_eq!(nodes, 2);
        assert_eq!(relationships, 1);
    }

    #[test]
    fn test_entity_import_with_llm_extraction() {
        let graph = PropertyGraph::in_memory().unwrap();
        let builder = GraphBuilder::new(&graph);
        let (company_id, filing_id) = builder.upsert_filing(&company(), &filing()).unwrap();

        let section = SectionEntities {
            section_type: "item_1a".to_string(),
            total_entities: 1,
            entities_by_type: Default::default(),
            raw_entities: vec![ExtractedEntity {
                label: EntityLabel::Risk,
                text: "market risk".to_string(),
                start: 0,
                end: 11,
            }],
            llm_extraction: Some(LlmExtraction {
                people: vec![ExecutivePerson {
                    name: "Timothy D. Cook".to_string(),
                    role: "Chief Executive Officer".to_string(),
                    start_date: None,
                }],
                risk_factors: vec![RiskFactor {
                    category: "Supply Chain".to_string(),
                    severity: 4,
                    description: "Concentration in Asia".to_string(),
                }],
            }),
        };

        let stats = builder.import_section_entities(company_id, filing_id, &section).unwrap();
        assert_eq!(stats.relationships, 3);

        assert!(graph.get_node(labels::PERSON, "timothy d. cook").unwrap().is_some());
        assert_eq!(
            graph.neighbors(company_id, Some(rels::HAS_EXECUTIVE)).unwrap().len(),
            1
        );
        assert_eq!(
            graph.neighbors(filing_id, Some(rels::DISCLOSES_RISK)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_fuzzy_person_dedup() {
        let graph = PropertyGraph::in_memory().unwrap();
        let builder = GraphBuilder::new(&graph);

        let first = builder.match_or_create(labels::PERSON, "Timothy D. Cook").unwrap();
        // Reordered form of the same name merges onto the existing node
        let second = builder.match_or_create(labels::PERSON, "Cook, Timothy D.").unwrap();
        assert_eq!(first, second);

        let third = builder.match_or_create(labels::PERSON, "Luca Maestri").unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_xbrl_import_key_concepts_only() {
        use finloom::types::{Fact, PeriodType};

        let store = Store::in_memory().unwrap();
        store.companies().upsert(&company()).unwrap();
        store.filings().upsert(&filing()).unwrap();

        for (concept, value) in [
            ("us-gaap:Assets", 352.0),
            ("us-gaap:NetIncomeLoss", 97.0),
            ("us-gaap:SomeObscureDetail", 1.0),
        ] {
            store
                .facts()
                .insert(&Fact {
                    id: None,
                    accession_number: "acc-1".to_string(),
                    concept_namespace: "us-gaap".to_string(),
                    concept_local: concept.rsplit(':').next().unwrap().to_string(),
                    concept_qname: concept.to_string(),
                    value: FactValue::Numeric(value),
                    unit: Some("USD".to_string()),
                    decimals: None,
                    period_type: PeriodType::Instant,
                    period_start: None,
                    period_end: NaiveDate::from_ymd_opt(2024, 9, 28),
                    dimensions: None,
                    is_custom: false,
                    section: None,
                    parent_concept: None,
                    depth: None,
                    label: None,
                })
                .unwrap();
        }

        let graph = PropertyGraph::in_memory().unwrap();
        let builder = GraphBuilder::new(&graph);
        let (_, filing_id) = builder.upsert_filing(&company(), &filing()).unwrap();

        let stats = builder.import_xbrl_facts(&store, "acc-1", filing_id, true).unwrap();
        assert_eq!(stats.nodes, 2); // obscure concept filtered out
        assert_eq!(
            graph.neighbors(filing_id, Some(rels::REPORTS_METRIC)).unwrap().len(),
            2
        );
    }
}
