//! Pull parser for XBRL instance documents.
//!
//! Walks the instance once, collecting contexts (periods + dimensions),
//! units and raw facts, then resolves facts against their contexts. A fact
//! that fails to resolve is logged and skipped; it never fails the parse.

use chrono::NaiveDate;
use finloom::error::{FinloomError, Result};
use finloom::types::{Fact, FactValue, PeriodType};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Namespace prefixes that belong to the XBRL plumbing, never to facts.
const STRUCTURAL_PREFIXES: &[&str] = &["xbrli", "link", "xbrldi", "xsi", "iso4217", "xlink", "ix"];

/// Prefixes in the standard reporting taxonomies.
const STANDARD_PREFIXES: &[&str] = &["us-gaap", "dei", "xbrli"];

/// Quick check whether a document head looks like an XBRL instance.
///
/// Looks for the instance namespace declaration, `context` elements, or
/// inline-XBRL markers in the supplied head (callers pass the first 8 KB).
pub fn sniff_is_instance(head: &str) -> bool {
    head.contains("xmlns:xbrli")
        || head.contains("http://www.xbrl.org/2003/instance")
        || head.contains("<context")
        || head.contains("<xbrli:context")
        || head.contains("xmlns:ix")
}

#[derive(Debug, Default, Clone)]
struct ParsedContext {
    instant: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    dimensions: BTreeMap<String, String>,
}

impl ParsedContext {
    fn period(&self) -> (PeriodType, Option<NaiveDate>, Option<NaiveDate>) {
        if let Some(instant) = self.instant {
            (PeriodType::Instant, None, Some(instant))
        } else if self.end.is_some() {
            (PeriodType::Duration, self.start, self.end)
        } else {
            (PeriodType::Unknown, None, None)
        }
    }
}

#[derive(Debug)]
struct RawFact {
    qname: String,
    context_ref: String,
    unit_ref: Option<String>,
    decimals: Option<i32>,
    text: String,
    depth: usize,
}

/// Parse an instance document into facts for `accession`.
///
/// # Errors
/// Returns `Xml` only for malformed XML; individual fact resolution
/// failures are skipped.
pub fn parse_instance(xml: &str, accession: &str) -> Result<Vec<Fact>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut contexts: HashMap<String, ParsedContext> = HashMap::new();
    let mut units: HashMap<String, String> = HashMap::new();
    let mut raw_facts: Vec<RawFact> = Vec::new();

    // Parser state
    let mut open_fact: Option<RawFact> = None;
    let mut current_context: Option<(String, ParsedContext)> = None;
    let mut current_unit: Option<(String, Option<String>)> = None;
    let mut element_stack: Vec<String> = Vec::new();
    let mut pending_dimension: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (prefix, local) = split_qname(e.name().as_ref());

                if let Some(fact) = open_fact.as_mut() {
                    fact.depth += 1;
                } else if local == "context" {
                    if let Some(id) = get_attr(&e, "id") {
                        current_context = Some((id, ParsedContext::default()));
                    }
                } else if local == "unit" {
                    if let Some(id) = get_attr(&e, "id") {
                        current_unit = Some((id, None));
                    }
                } else if current_context.is_some() {
                    if local == "explicitMember" || local == "typedMember" {
                        pending_dimension = get_attr(&e, "dimension");
                    }
                } else if let Some(context_ref) = get_attr(&e, "contextRef") {
                    if !STRUCTURAL_PREFIXES.contains(&prefix.as_str()) {
                        open_fact = Some(RawFact {
                            qname: qname_string(&prefix, &local),
                            context_ref,
                            unit_ref: get_attr(&e, "unitRef"),
                            decimals: get_attr(&e, "decimals").and_then(|d| d.parse().ok()),
                            text: String::new(),
                            depth: 0,
                        });
                    }
                }
                element_stack.push(local);
            }
            Ok(Event::Empty(e)) => {
                let (prefix, local) = split_qname(e.name().as_ref());
                if open_fact.is_none() && current_context.is_none() {
                    if let Some(context_ref) = get_attr(&e, "contextRef") {
                        if !STRUCTURAL_PREFIXES.contains(&prefix.as_str()) {
                            raw_facts.push(RawFact {
                                qname: qname_string(&prefix, &local),
                                context_ref,
                                unit_ref: get_attr(&e, "unitRef"),
                                decimals: get_attr(&e, "decimals").and_then(|d| d.parse().ok()),
                                text: String::new(),
                                depth: 0,
                            });
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| FinloomError::Xml(e.to_string()))?
                    .into_owned();

                if let Some(fact) = open_fact.as_mut() {
                    fact.text.push_str(&text);
                } else if let Some((_, context)) = current_context.as_mut() {
                    if let Some(dim) = pending_dimension.clone() {
                        context.dimensions.insert(dim, text.trim().to_string());
                    } else {
                        match element_stack.last().map(String::as_str) {
                            Some("instant") => context.instant = parse_date(&text),
                            Some("startDate") => context.start = parse_date(&text),
                            Some("endDate") => context.end = parse_date(&text),
                            _ => {}
                        }
                    }
                } else if let Some((_, measure)) = current_unit.as_mut() {
                    if element_stack.last().map(String::as_str) == Some("measure")
                        && measure.is_none()
                    {
                        *measure = Some(local_part(text.trim()).to_string());
                    }
                }
            }
            Ok(Event::End(e)) => {
                let (_, local) = split_qname(e.name().as_ref());
                element_stack.pop();

                if open_fact.is_some() {
                    let nested = open_fact.as_ref().is_some_and(|f| f.depth > 0);
                    if nested {
                        if let Some(fact) = open_fact.as_mut() {
                            fact.depth -= 1;
                        }
                    } else if let Some(fact) = open_fact.take() {
                        raw_facts.push(fact);
                    }
                } else if local == "context" {
                    if let Some((id, context)) = current_context.take() {
                        contexts.insert(id, context);
                    }
                } else if local == "unit" {
                    if let Some((id, Some(measure))) = current_unit.take() {
                        units.insert(id, measure);
                    }
                } else if local == "explicitMember" || local == "typedMember" {
                    pending_dimension = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FinloomError::Xml(e.to_string())),
        }
    }

    let mut facts = Vec::with_capacity(raw_facts.len());
    let mut skipped = 0usize;
    for raw in raw_facts {
        match resolve_fact(raw, accession, &contexts, &units) {
            Some(fact) => facts.push(fact),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!(accession, skipped, "facts skipped during resolution");
    }
    Ok(facts)
}

fn resolve_fact(
    raw: RawFact,
    accession: &str,
    contexts: &HashMap<String, ParsedContext>,
    units: &HashMap<String, String>,
) -> Option<Fact> {
    let (prefix, local) = raw.qname.split_once(':').map_or(("", raw.qname.as_str()), |(p, l)| (p, l));

    let (period_type, period_start, period_end, dimensions) = match contexts.get(&raw.context_ref) {
        Some(context) => {
            let (pt, start, end) = context.period();
            let dims = if context.dimensions.is_empty() {
                None
            } else {
                Some(context.dimensions.clone())
            };
            (pt, start, end, dims)
        }
        None => {
            debug!(concept = %raw.qname, context = %raw.context_ref, "fact references unknown context");
            (PeriodType::Unknown, None, None, None)
        }
    };

    let text = raw.text.trim();
    let value = if text.is_empty() {
        FactValue::Missing
    } else if let Ok(n) = text.replace(',', "").parse::<f64>() {
        FactValue::Numeric(n)
    } else {
        FactValue::Text(text.to_string())
    };

    let namespace = standardize_prefix(prefix);
    let is_custom = !STANDARD_PREFIXES.contains(&prefix);

    Some(Fact {
        id: None,
        accession_number: accession.to_string(),
        concept_namespace: namespace.to_string(),
        concept_local: local.to_string(),
        concept_qname: if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{prefix}:{local}")
        },
        value,
        unit: raw.unit_ref.and_then(|u| units.get(&u).cloned()),
        decimals: raw.decimals,
        period_type,
        period_start,
        period_end,
        dimensions,
        is_custom,
        section: None,
        parent_concept: None,
        depth: None,
        label: None,
    })
}

/// Standardize a namespace prefix onto the fixed map; everything outside it
/// collapses to empty.
fn standardize_prefix(prefix: &str) -> &str {
    match prefix {
        "us-gaap" => "us-gaap",
        "dei" => "dei",
        "xbrli" => "xbrli",
        _ => "",
    }
}

fn split_qname(name: &[u8]) -> (String, String) {
    let s = String::from_utf8_lossy(name);
    match s.split_once(':') {
        Some((p, l)) => (p.to_string(), l.to_string()),
        None => (String::new(), s.into_owned()),
    }
}

fn qname_string(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

fn get_attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        let key = a.key.as_ref();
        // Match both bare and prefixed attribute names (xlink:href vs href)
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

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn local_part(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}
