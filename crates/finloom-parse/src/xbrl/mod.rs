//! XBRL reading: instance documents plus linkbase cross-resolution.
//!
//! The reader locates the instance document inside a downloaded filing
//! directory, pulls typed facts out of it, and (when the caller asks for
//! the full fact set) enriches them with hierarchy and human labels from
//! the presentation and label linkbases.

mod instance;
mod linkbase;

pub use instance::{parse_instance, sniff_is_instance};
pub use linkbase::{ConceptHierarchy, parse_label_linkbase, parse_presentation_linkbase};

use chrono::NaiveDate;
use finloom::error::Result;
use finloom::types::Fact;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of parsing one filing's XBRL payload.
#[derive(Debug, Clone)]
pub struct XbrlParseResult {
    /// Whether any usable output was produced
    pub success: bool,
    /// Extracted facts
    pub facts: Vec<Fact>,
    /// Document period end, when determinable
    pub period_end: Option<NaiveDate>,
    /// Wall time in milliseconds
    pub parse_time_ms: u64,
    /// Failure description, when unsuccessful
    pub error: Option<String>,
}

impl XbrlParseResult {
    fn failure(error: &str, started: Instant) -> Self {
        Self {
            success: false,
            facts: Vec::new(),
            period_end: None,
            parse_time_ms: started.elapsed().as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

/// Find the XBRL instance document inside a filing directory.
///
/// The instance is the first `.xml` that is neither a linkbase nor a
/// schema nor a known excluded artifact, and whose first 8 KB carries an
/// XBRL indicator.
pub fn locate_instance(dir: &Path) -> Option<PathBuf> {
    const LINKBASE_SUFFIXES: &[&str] = &["_cal.xml", "_def.xml", "_lab.xml", "_pre.xml"];
    const EXCLUDED: &[&str] = &["filingsummary", "metadata"];

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            name.ends_with(".xml")
                && !LINKBASE_SUFFIXES.iter().any(|s| name.ends_with(s))
                && !EXCLUDED.iter().any(|f| name.contains(f))
        })
        .collect();
    candidates.sort();

    candidates.into_iter().find(|path| {
        let mut head = vec![0u8; 8192];
        let Ok(mut file) = std::fs::File::open(path) else {
            return false;
        };
        use std::io::Read;
        let n = file.read(&mut head).unwrap_or(0);
        head.truncate(n);
        sniff_is_instance(&String::from_utf8_lossy(&head))
    })
}

/// Parse the XBRL payload of a downloaded filing directory.
///
/// With `all_facts`, the presentation (`*_pre.xml`) and label (`*_lab.xml`)
/// linkbases are parsed too and each fact is enriched with its statement
/// section, parent concept, depth and human label.
pub fn parse_filing(dir: &Path, accession: &str, all_facts: bool) -> XbrlParseResult {
    let started = Instant::now();

    let Some(instance_path) = locate_instance(dir) else {
        return XbrlParseResult::failure("No XBRL instance document found", started);
    };
    debug!(instance = %instance_path.display(), "parsing XBRL instance");

    let xml = match std::fs::read_to_string(&instance_path) {
        Ok(xml) => xml,
        Err(e) => return XbrlParseResult::failure(&e.to_string(), started),
    };

    let mut facts = match parse_instance(&xml, accession) {
        Ok(facts) => facts,
        Err(e) => return XbrlParseResult::failure(&e.to_string(), started),
    };

    if all_facts {
        enrich_from_linkbases(dir, &mut facts);
    }

    let period_end = document_period_end(&facts);

    XbrlParseResult {
        success: true,
        facts,
        period_end,
        parse_time_ms: started.elapsed().as_millis() as u64,
        error: None,
    }
}

/// Enrich facts in place with hierarchy and labels from the linkbases.
/// Linkbase failures degrade to un-enriched facts, never to a parse error.
fn enrich_from_linkbases(dir: &Path, facts: &mut [Fact]) {
    let hierarchy = find_with_suffix(dir, "_pre.xml")
        .and_then(|p| match std::fs::read_to_string(&p) {
            Ok(xml) => match parse_presentation_linkbase(&xml) {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!(error = %e, "presentation linkbase parse failed");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "presentation linkbase unreadable");
                None
            }
        })
        .unwrap_or_default();

    let labels: HashMap<String, String> = find_with_suffix(dir, "_lab.xml")
        .and_then(|p| match std::fs::read_to_string(&p) {
            Ok(xml) => match parse_label_linkbase(&xml) {
                Ok(l) => Some(l),
                Err(e) => {
                    warn!(error = %e, "label linkbase parse failed");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "label linkbase unreadable");
                None
            }
        })
        .unwrap_or_default();

    for fact in facts.iter_mut() {
        if let Some(entry) = hierarchy.get(&fact.concept_qname) {
            fact.section = Some(entry.section.clone());
            fact.parent_concept = entry.parent_concept.clone();
            fact.depth = Some(entry.depth);
        }
        fact.label = labels
            .get(&fact.concept_qname)
            .cloned()
            .or_else(|| Some(split_camel_case(&fact.concept_local)));
    }
}

fn find_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().ends_with(suffix))
                .unwrap_or(false)
        })
}

/// Document period end: the `DocumentPeriodEndDate` fact when present,
/// otherwise the modal period end across all facts.
pub fn document_period_end(facts: &[Fact]) -> Option<NaiveDate> {
    if let Some(fact) = facts.iter().find(|f| f.concept_local == "DocumentPeriodEndDate") {
        if let Some(text) = fact.value.as_text() {
            if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
                return Some(date);
            }
        }
        if let Some(end) = fact.period_end {
            return Some(end);
        }
    }

    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    for fact in facts {
        if let Some(end) = fact.period_end {
            *counts.entry(end).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(date, count)| (count, date))
        .map(|(date, _)| date)
}

/// Fall back to a readable label by splitting a camel-cased local name.
pub fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.push(c);
    }
    out
}
