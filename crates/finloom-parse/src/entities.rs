//! Entity reading over extracted section text.
//!
//! Two phases: a deterministic pattern phase emitting standard entity
//! labels plus the custom `METRIC`/`RISK` financial labels, with noise
//! filters over cardinals and dates; and an optional LLM phase that pulls
//! structured executives (item 10) and risk factors (item 1A) out of the
//! text. LLM failures are tolerated; the pattern phase always answers.

use finloom_llm::ChatClient;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Label of one recognized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    /// Person name
    Person,
    /// Organization
    Org,
    /// Geo-political entity
    Gpe,
    /// Monetary amount
    Money,
    /// Date or period
    Date,
    /// Bare number
    Cardinal,
    /// Financial metric phrase
    Metric,
    /// Risk phrase
    Risk,
}

impl EntityLabel {
    /// Upper-case string form used in grouped counts.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Money => "MONEY",
            Self::Date => "DATE",
            Self::Cardinal => "CARDINAL",
            Self::Metric => "METRIC",
            Self::Risk => "RISK",
        }
    }
}

/// One recognized entity span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Label
    pub label: EntityLabel,
    /// Matched text
    pub text: String,
    /// Byte offset of the match start
    pub start: usize,
    /// Byte offset of the match end
    pub end: usize,
}

/// Structured output of the optional LLM phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmExtraction {
    /// Executives and directors
    #[serde(default)]
    pub people: Vec<ExecutivePerson>,
    /// Categorized risk factors
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
}

/// One executive from the LLM phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutivePerson {
    /// Full name
    pub name: String,
    /// Role or title
    pub role: String,
    /// Start date, when disclosed
    #[serde(default)]
    pub start_date: Option<String>,
}

/// One risk factor from the LLM phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Risk category
    pub category: String,
    /// Severity 1 (minor) to 5 (existential)
    pub severity: u8,
    /// Short description
    pub description: String,
}

/// Entities read out of one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionEntities {
    /// Section the entities came from
    pub section_type: String,
    /// Total entity count after filtering
    pub total_entities: usize,
    /// Counts by label
    pub entities_by_type: BTreeMap<String, usize>,
    /// The entities themselves
    pub raw_entities: Vec<ExtractedEntity>,
    /// LLM phase output, when it ran and succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_extraction: Option<LlmExtraction>,
}

/// Fixed financial-metric phrases (longest first so multi-word phrases win).
const METRIC_PHRASES: &[&str] = &[
    "operating cash flow",
    "free cash flow",
    "earnings per share",
    "market capitalization",
    "long term debt",
    "current liabilities",
    "shareholders equity",
    "stockholders equity",
    "total revenue",
    "net revenue",
    "total assets",
    "total equity",
    "total debt",
    "book value",
    "cash flow",
    "net income",
    "net earnings",
    "operating income",
    "gross profit",
    "gross margin",
    "market cap",
    "revenues",
    "revenue",
    "ebitda",
    "eps",
];

/// Fixed risk phrases.
const RISK_PHRASES: &[&str] = &[
    "market risk",
    "credit risk",
    "operational risk",
    "liquidity risk",
    "regulatory risk",
    "compliance risk",
    "cybersecurity risk",
    "reputational risk",
    "interest rate risk",
    "foreign currency risk",
];

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?\d[\d,]*(?:\.\d+)?(?:\s*(?:thousand|million|billion|trillion))?").unwrap()
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \b(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},\s*\d{4}
        | \b\d{4}-\d{2}-\d{2}\b
        | \bQ[1-4]\s*\d{4}\b
        | \b\d{4}\b",
    )
    .unwrap()
});

static CARDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d[\d,]*(?:\.\d+)?%?\b").unwrap());

static ORG_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Longer suffix alternatives first: the regex engine is leftmost-first
    Regex::new(
        r"\b(?:[A-Z][A-Za-z&\.]+\s+)+(?:Incorporated|Corporation|Company|Technologies|Holdings|Systems|Group|Inc\.|Corp\.|L\.P\.|Ltd\.|LLC|Inc|Corp|Ltd)",
    )
    .unwrap()
});

static PERSON_HONORIFIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Mr\.|Ms\.|Mrs\.|Dr\.)\s+([A-Z][a-z]+(?:\s+[A-Z]\.)?(?:\s+[A-Z][a-z]+)+)")
        .unwrap()
});

static PERSON_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Z][a-z]+(?:\s+[A-Z]\.)?\s+[A-Z][a-z]+),\s*(?:our\s+)?(?:Chief|President|Chairman|Director|Senior Vice President|Executive Vice President|CEO|CFO|COO)",
    )
    .unwrap()
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d{3}\)\s*\d{3}-\d{4}$|^\d{3}-\d{3}-\d{4}$").unwrap());
static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{5}(-\d{4})?$").unwrap());

const ROMAN_NUMERALS: &[&str] = &["I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X"];

const DATE_FREQUENCY_WORDS: &[&str] = &[
    "quarterly", "annual", "monthly", "weekly", "daily", "first", "second", "third", "fourth",
    "fifth", "prior", "current", "subsequent", "future", "initial", "final", "interim",
];

/// Reject phone numbers, ZIP codes, Roman numerals and page-number-sized
/// integers from `CARDINAL` matches.
pub fn is_valid_cardinal(text: &str) -> bool {
    let trimmed = text.trim();
    if PHONE_RE.is_match(trimmed) || ZIP_RE.is_match(trimmed) {
        return false;
    }
    if ROMAN_NUMERALS.contains(&trimmed) {
        return false;
    }
    if trimmed.len() <= 2 {
        if let Ok(n) = trimmed.parse::<u32>() {
            if n < 500 {
                return false;
            }
        }
    }
    true
}

/// Reject frequency words; accept years 1900-2100, quarters, month-day-year
/// and ISO dates.
pub fn is_valid_date(text: &str) -> bool {
    let trimmed = text.trim();
    if DATE_FREQUENCY_WORDS.contains(&trimmed.to_lowercase().as_str()) {
        return false;
    }
    if trimmed.len() == 4 {
        if let Ok(year) = trimmed.parse::<i32>() {
            return (1900..=2100).contains(&year);
        }
    }
    true
}

/// Deterministic pattern phase over one section's text.
pub fn extract_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();
    let lower = text.to_lowercase();

    let mut push = |label: EntityLabel, start: usize, end: usize| {
        // Offsets from the lowercased copy can straddle multi-byte chars
        let Some(slice) = text.get(start..end) else {
            return;
        };
        entities.push(ExtractedEntity { label, text: slice.to_string(), start, end });
    };

    for phrase in METRIC_PHRASES {
        for (start, _) in lower.match_indices(phrase) {
            if is_word_bounded(&lower, start, phrase.len()) {
                push(EntityLabel::Metric, start, start + phrase.len());
            }
        }
    }
    for phrase in RISK_PHRASES {
        for (start, _) in lower.match_indices(phrase) {
            if is_word_bounded(&lower, start, phrase.len()) {
                push(EntityLabel::Risk, start, start + phrase.len());
            }
        }
    }

    for m in MONEY_RE.find_iter(text) {
        push(EntityLabel::Money, m.start(), m.end());
    }
    for m in ORG_RE.find_iter(text) {
        push(EntityLabel::Org, m.start(), m.end());
    }
    for captures in PERSON_HONORIFIC_RE.captures_iter(text) {
        if let Some(name) = captures.get(1) {
            push(EntityLabel::Person, name.start(), name.end());
        }
    }
    for captures in PERSON_TITLE_RE.captures_iter(text) {
        if let Some(name) = captures.get(1) {
            push(EntityLabel::Person, name.start(), name.end());
        }
    }
    for m in DATE_RE.find_iter(text) {
        if is_valid_date(m.as_str()) {
            push(EntityLabel::Date, m.start(), m.end());
        }
    }
    for m in CARDINAL_RE.find_iter(text) {
        if is_valid_cardinal(m.as_str()) {
            push(EntityLabel::Cardinal, m.start(), m.end());
        }
    }

    // Drop spans fully covered by an earlier (higher-priority) match
    entities.sort_by_key(|e| (e.start, std::cmp::Reverse(e.end)));
    let mut filtered: Vec<ExtractedEntity> = Vec::with_capacity(entities.len());
    for entity in entities {
        let covered = filtered
            .iter()
            .any(|kept| kept.start <= entity.start && entity.end <= kept.end && kept.label != entity.label);
        if !covered {
            filtered.push(entity);
        }
    }
    filtered
}

fn is_word_bounded(haystack: &str, start: usize, len: usize) -> bool {
    let before_ok = start == 0
        || !haystack[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric());
    let end = start + len;
    let after_ok = end >= haystack.len()
        || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
    before_ok && after_ok
}

/// Sections that get the LLM phase and what it extracts there.
fn llm_prompt_for(section_type: &str) -> Option<&'static str> {
    match section_type {
        "item_10" => Some(
            "Extract executives and directors from this filing section. \
             Respond with JSON: {\"people\": [{\"name\": str, \"role\": str, \"start_date\": str|null}], \"risk_factors\": []}",
        ),
        "item_1a" => Some(
            "Extract the main risk factors from this filing section. \
             Respond with JSON: {\"people\": [], \"risk_factors\": [{\"category\": str, \"severity\": 1-5, \"description\": str}]}",
        ),
        _ => None,
    }
}

/// Entity reader combining the pattern phase with the optional LLM phase.
#[derive(Debug)]
pub struct EntityReader {
    chat: Option<ChatClient>,
}

impl EntityReader {
    /// Pattern-only reader.
    pub const fn new() -> Self {
        Self { chat: None }
    }

    /// Reader with the LLM phase enabled.
    pub const fn with_llm(chat: ChatClient) -> Self {
        Self { chat: Some(chat) }
    }

    /// Read one section: pattern phase always, LLM phase for the sections
    /// that carry executives or risk factors.
    pub async fn read_section(&self, section_type: &str, text: &str) -> SectionEntities {
        let raw_entities = extract_entities(text);

        let mut entities_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for entity in &raw_entities {
            *entities_by_type.entry(entity.label.as_str().to_string()).or_default() += 1;
        }

        let llm_extraction = match (&self.chat, llm_prompt_for(section_type)) {
            (Some(chat), Some(system)) => {
                // Cap prompt size; the head of a section names the executives
                let excerpt: String = text.chars().take(6000).collect();
                match chat.complete_json::<LlmExtraction>(system, &excerpt).await {
                    Ok(extraction) => Some(extraction),
                    Err(e) => {
                        warn!(section_type, error = %e, "LLM entity extraction failed");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(section_type, total = raw_entities.len(), "entities extracted");
        SectionEntities {
            section_type: section_type.to_string(),
            total_entities: raw_entities.len(),
            entities_by_type,
            raw_entities,
            llm_extraction,
        }
    }
}

impl Default for EntityReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_metric_and_risk_phrases() {
        let text = "Net income grew while free cash flow declined; market risk remains elevated.";
        let entities = extract_entities(text);
        let labels: Vec<(&str, &str)> = entities
            .iter()
            .map(|e| (e.label.as_str(), e.text.as_str()))
            .collect();
        assert!(labels.contains(&("METRIC", "Net income")));
        assert!(labels.contains(&("METRIC", "free cash flow")));
        assert!(labels.contains(&("RISK", "market risk")));
    }

    #[test]
    fn test_money_detection() {
        let entities = extract_entities("Revenue of $383,285 million, up from $1.2 billion.");
        let money: Vec<&str> = entities
            .iter()
            .filter(|e| e.label == EntityLabel::Money)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(money, vec!["$383,285 million", "$1.2 billion"]);
    }

    #[test]
    fn test_org_and_person_detection() {
        let text = "Apple Inc. competes broadly. Timothy D. Cook, Chief Executive Officer, leads it.";
        let entities = extract_entities(text);
        assert!(entities.iter().any(|e| e.label == EntityLabel::Org && e.text == "Apple Inc."));
        assert!(entities
            .iter()
            .any(|e| e.label == EntityLabel::Person && e.text == "Timothy D. Cook"));
    }

    #[rstest]
    #[case("(408) 996-1010", false)]
    #[case("95014", false)]
    #[case("III", false)]
    #[case("42", false)] // page-number-ish
    #[case("512", true)]
    #[case("1,234", true)]
    fn test_cardinal_filter(#[case] text: &str, #[case] valid: bool) {
        assert_eq!(is_valid_cardinal(text), valid, "{text}");
    }

    #[rstest]
    #[case("quarterly", false)]
    #[case("annual", false)]
    #[case("2023", true)]
    #[case("1899", false)]
    #[case("2101", false)]
    #[case("September 30, 2023", true)]
    #[case("2023-09-30", true)]
    fn test_date_filter(#[case] text: &str, #[case] valid: bool) {
        assert_eq!(is_valid_date(text), valid, "{text}");
    }

    #[tokio::test]
    async fn test_read_section_without_llm() {
        let reader = EntityReader::new();
        let section = reader
            .read_section("item_1a", "Credit risk and liquidity risk affected net income in 2023.")
            .await;
        assert_eq!(section.section_type, "item_1a");
        assert!(section.total_entities >= 3);
        assert!(section.entities_by_type.contains_key("RISK"));
        assert!(section.llm_extraction.is_none());
    }

    #[test]
    fn test_year_inside_money_not_double_counted() {
        // The cardinal "2023" standing alone is both a DATE and a CARDINAL
        // candidate; the coverage filter keeps the date
        let entities = extract_entities("In 2023 results improved.");
        let dates = entities.iter().filter(|e| e.label == EntityLabel::Date).count();
        assert_eq!(dates, 1);
    }
}
