//! Presentation and label linkbase parsing.
//!
//! The presentation linkbase yields each concept's statement section,
//! parent and depth; the label linkbase yields human-readable labels with
//! a preference for terse/standard roles.

use finloom::error::{FinloomError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// A concept's place in the presentation hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptHierarchy {
    /// Qualified concept name
    pub concept_name: String,
    /// Inferred statement section
    pub section: String,
    /// Parent concept, when the arc network provides one
    pub parent_concept: Option<String>,
    /// Depth below the role's root
    pub depth: i32,
    /// Presentation order among siblings
    pub order: f64,
}

/// Map a presentation-role URI onto a canonical statement section.
///
/// Role URIs differ wildly between reporters
/// (`…/role/CONSOLIDATEDSTATEMENTSOFOPERATIONS`,
/// `…/role/statement/StatementOfFinancialPositionClassified`); a substring
/// table over the cleaned last path segment absorbs the variation.
pub fn section_from_role(role: &str) -> String {
    if role.is_empty() {
        return "Other".to_string();
    }
    let segment = role.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let cleaned = segment
        .replace("role", "")
        .replace("Role", "")
        .replace("CONSOLIDATED", "")
        .replace("Consolidated", "")
        .replace("STATEMENTS", "Statement")
        .replace("Statements", "Statement")
        .replace("Statement", "");

    const SECTION_MAP: &[(&str, &str)] = &[
        ("IncomeStatement", "IncomeStatement"),
        ("OFOPERATIONS", "IncomeStatement"),
        ("Operations", "IncomeStatement"),
        ("ComprehensiveIncome", "IncomeStatement"),
        ("BalanceSheet", "BalanceSheet"),
        ("FinancialPosition", "BalanceSheet"),
        ("OFFINANCIALPOSITION", "BalanceSheet"),
        ("CashFlow", "CashFlowStatement"),
        ("OFCASHFLOWS", "CashFlowStatement"),
        ("CashFlows", "CashFlowStatement"),
        ("Equity", "StockholdersEquity"),
        ("OFSTOCKHOLDERSEQUITY", "StockholdersEquity"),
        ("StockholdersEquity", "StockholdersEquity"),
        ("FinancialInstruments", "FinancialInstruments"),
        ("FairValue", "FairValue"),
        ("Debt", "Debt"),
        ("Leases", "Leases"),
        ("Commitments", "Commitments"),
        ("IncomeTaxes", "IncomeTaxes"),
        ("Taxes", "IncomeTaxes"),
        ("SegmentReporting", "Segments"),
        ("Segments", "Segments"),
        ("CoverPage", "CoverPage"),
        ("DocumentAndEntityInformation", "CoverPage"),
    ];

    let lower = cleaned.to_lowercase();
    for (pattern, standard) in SECTION_MAP {
        if lower.contains(&pattern.to_lowercase()) {
            return (*standard).to_string();
        }
    }

    let trimmed = cleaned.trim_matches(['_', '-']);
    if trimmed.is_empty() {
        "Other".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turn an href fragment (`us-gaap_Assets`) into a qualified name
/// (`us-gaap:Assets`).
fn concept_from_href(href: &str) -> Option<String> {
    let fragment = href.rsplit('#').next()?;
    if fragment.is_empty() {
        return None;
    }
    Some(match fragment.split_once('_') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
            format!("{prefix}:{local}")
        }
        _ => fragment.to_string(),
    })
}

fn get_attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let key = a.key.as_ref();
        let matches = key == name.as_bytes()
            || key
                .split(|&b| b == b':')
                .next_back()
                .is_some_and(|suffix| suffix == name.as_bytes());
        if matches {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn local_name(name: &[u8]) -> String {
    let s = String::from_utf8_lossy(name);
    s.rsplit(':').next().unwrap_or(&s).to_string()
}

/// Parse a presentation linkbase into a concept hierarchy map.
///
/// Concepts seen under more than one role keep the first role's entry.
pub fn parse_presentation_linkbase(xml: &str) -> Result<HashMap<String, ConceptHierarchy>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut hierarchy: HashMap<String, ConceptHierarchy> = HashMap::new();

    // Per-presentationLink state
    let mut in_link = false;
    let mut section = String::new();
    let mut label_to_concept: HashMap<String, String> = HashMap::new();
    let mut parent_child: HashMap<String, String> = HashMap::new();
    let mut orders: HashMap<String, f64> = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                // Arcs resolve against locs already seen, so locs must come
                // first within the link; EDGAR linkbases order them that way
                handle_pre_element(
                    &e,
                    &mut in_link,
                    &mut section,
                    &mut label_to_concept,
                    &mut parent_child,
                    &mut orders,
                );
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == "presentationLink" {
                    for concept in label_to_concept.values() {
                        if !hierarchy.contains_key(concept) {
                            hierarchy.insert(
                                concept.clone(),
                                ConceptHierarchy {
                                    concept_name: concept.clone(),
                                    section: section.clone(),
                                    parent_concept: parent_child.get(concept).cloned(),
                                    depth: depth_of(concept, &parent_child),
                                    order: orders.get(concept).copied().unwrap_or(999.0),
                                },
                            );
                        }
                    }
                    in_link = false;
                    label_to_concept.clear();
                    parent_child.clear();
                    orders.clear();
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FinloomError::Xml(e.to_string())),
        }
    }

    Ok(hierarchy)
}

fn handle_pre_element(
    e: &BytesStart<'_>,
    in_link: &mut bool,
    section: &mut String,
    label_to_concept: &mut HashMap<String, String>,
    parent_child: &mut HashMap<String, String>,
    orders: &mut HashMap<String, f64>,
) {
    match local_name(e.name().as_ref()).as_str() {
        "presentationLink" => {
            *in_link = true;
            *section = section_from_role(&get_attr(e, "role").unwrap_or_default());
        }
        "loc" if *in_link => {
            if let (Some(label), Some(href)) = (get_attr(e, "label"), get_attr(e, "href")) {
                if let Some(concept) = concept_from_href(&href) {
                    label_to_concept.insert(label, concept);
                }
            }
        }
        "presentationArc" if *in_link => {
            let from = get_attr(e, "from");
            let to = get_attr(e, "to");
            let order = get_attr(e, "order")
                .and_then(|o| o.parse::<f64>().ok())
                .unwrap_or(1.0);
            if let (Some(from), Some(to)) = (from, to) {
                if let (Some(parent), Some(child)) =
                    (label_to_concept.get(&from), label_to_concept.get(&to))
                {
                    parent_child.insert(child.clone(), parent.clone());
                    orders.insert(child.clone(), order);
                }
            }
        }
        _ => {}
    }
}

fn depth_of(concept: &str, parent_child: &HashMap<String, String>) -> i32 {
    let mut depth = 0;
    let mut current = concept;
    let mut visited = std::collections::HashSet::new();
    while let Some(parent) = parent_child.get(current) {
        if !visited.insert(current.to_string()) {
            break;
        }
        depth += 1;
        current = parent;
    }
    depth
}

/// Parse a label linkbase into `{concept -> human label}`.
///
/// Terse and standard label roles win over documentation and total roles;
/// the first label for a concept otherwise sticks.
pub fn parse_label_linkbase(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut labels: HashMap<String, String> = HashMap::new();

    // Per-labelLink state
    let mut loc_to_concept: HashMap<String, String> = HashMap::new();
    let mut label_texts: HashMap<String, String> = HashMap::new();
    let mut preferred: HashMap<String, bool> = HashMap::new();
    let mut arcs: Vec<(String, String)> = Vec::new();
    let mut current_label: Option<(String, bool, String)> = None; // (id, preferred, text)

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match local_name(e.name().as_ref()).as_str() {
                "loc" => {
                    if let (Some(label), Some(href)) = (get_attr(&e, "label"), get_attr(&e, "href")) {
                        if let Some(concept) = concept_from_href(&href) {
                            loc_to_concept.insert(label, concept);
                        }
                    }
                }
                "labelArc" => {
                    if let (Some(from), Some(to)) = (get_attr(&e, "from"), get_attr(&e, "to")) {
                        arcs.push((from, to));
                    }
                }
                "label" => {
                    let id = get_attr(&e, "label").unwrap_or_default();
                    let role = get_attr(&e, "role").unwrap_or_default().to_lowercase();
                    let is_preferred = role.contains("terse") || role.ends_with("/label");
                    current_label = Some((id, is_preferred, String::new()));
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some((_, _, text)) = current_label.as_mut() {
                    text.push_str(&t.unescape().map_err(|e| FinloomError::Xml(e.to_string()))?);
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()).as_str() {
                "label" => {
                    if let Some((id, is_preferred, text)) = current_label.take() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            let existing_preferred = preferred.get(&id).copied().unwrap_or(false);
                            if is_preferred || (!existing_preferred && !label_texts.contains_key(&id)) {
                                label_texts.insert(id.clone(), text);
                                preferred.insert(id, is_preferred);
                            }
                        }
                    }
                }
                "labelLink" => {
                    for (from, to) in arcs.drain(..) {
                        if let (Some(concept), Some(text)) =
                            (loc_to_concept.get(&from), label_texts.get(&to))
                        {
                            labels.entry(concept.clone()).or_insert_with(|| text.clone());
                        }
                    }
                    loc_to_concept.clear();
                    label_texts.clear();
                    preferred.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FinloomError::Xml(e.to_string())),
        }
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_from_role() {
        assert_eq!(
            section_from_role("http://www.apple.com/role/CONSOLIDATEDSTATEMENTSOFOPERATIONS"),
            "IncomeStatement"
        );
        assert_eq!(
            section_from_role(
                "http://fasb.org/us-gaap/role/statement/StatementOfFinancialPositionClassified"
            ),
            "BalanceSheet"
        );
        assert_eq!(
            section_from_role("http://x.com/role/CONSOLIDATEDSTATEMENTSOFCASHFLOWS"),
            "CashFlowStatement"
        );
        assert_eq!(section_from_role(""), "Other");
    }

    #[test]
    fn test_concept_from_href() {
        assert_eq!(
            concept_from_href("us-gaap-2023.xsd#us-gaap_Assets").as_deref(),
            Some("us-gaap:Assets")
        );
        assert_eq!(
            concept_from_href("aapl-20230930.xsd#aapl_ServicesRevenue").as_deref(),
            Some("aapl:ServicesRevenue")
        );
    }

    const SAMPLE_PRE: &str = r#"<?xml version="1.0"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:role="http://www.apple.com/role/CONSOLIDATEDSTATEMENTSOFOPERATIONS">
    <link:loc xlink:label="loc_rev" xlink:href="us-gaap.xsd#us-gaap_Revenues"/>
    <link:loc xlink:label="loc_cost" xlink:href="us-gaap.xsd#us-gaap_CostOfRevenue"/>
    <link:loc xlink:label="loc_gross" xlink:href="us-gaap.xsd#us-gaap_GrossProfit"/>
    <link:presentationArc xlink:from="loc_rev" xlink:to="loc_cost" order="1.0"/>
    <link:presentationArc xlink:from="loc_cost" xlink:to="loc_gross" order="2.0"/>
  </link:presentationLink>
</link:linkbase>"#;

    #[test]
    fn test_presentation_hierarchy() {
        let hierarchy = parse_presentation_linkbase(SAMPLE_PRE).unwrap();
        assert_eq!(hierarchy.len(), 3);

        let revenues = &hierarchy["us-gaap:Revenues"];
        assert_eq!(revenues.section, "IncomeStatement");
        assert_eq!(revenues.depth, 0);
        assert!(revenues.parent_concept.is_none());

        let cost = &hierarchy["us-gaap:CostOfRevenue"];
        assert_eq!(cost.parent_concept.as_deref(), Some("us-gaap:Revenues"));
        assert_eq!(cost.depth, 1);
        assert_eq!(cost.order, 1.0);

        let gross = &hierarchy["us-gaap:GrossProfit"];
        assert_eq!(gross.depth, 2);
    }

    const SAMPLE_LAB: &str = r#"<?xml version="1.0"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink>
    <link:loc xlink:label="loc_assets" xlink:href="us-gaap.xsd#us-gaap_Assets"/>
    <link:label xlink:label="lab_assets" xlink:role="http://www.xbrl.org/2003/role/documentation">Long documentation text about assets.</link:label>
    <link:label xlink:label="lab_assets" xlink:role="http://www.xbrl.org/2003/role/terseLabel">Total assets</link:label>
    <link:labelArc xlink:from="loc_assets" xlink:to="lab_assets"/>
  </link:labelLink>
</link:linkbase>"#;

    #[test]
    fn test_label_prefers_terse_role() {
        let labels = parse_label_linkbase(SAMPLE_LAB).unwrap();
        assert_eq!(labels.get("us-gaap:Assets").map(String::as_str), Some("Total assets"));
    }
}
