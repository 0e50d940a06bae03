//! HTML section extraction for annual filings.
//!
//! Partitions the primary document into typed elements, detects canonical
//! section headers (`Item 1` through `Item 16`), groups elements between
//! headers, and emits both per-section records and a full-document markdown
//! with embedded section markers for citation support.

mod partition;

pub use partition::{ElementCategory, PartitionedElement, elements_to_markdown, partition_html};

use finloom::config::SectionConfig;
use finloom::types::{CrossReference, Section};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Canonical definition of one 10-K section.
#[derive(Debug, Clone, Copy)]
pub struct SectionDefinition {
    /// Section id (`item_1a`)
    pub id: &'static str,
    /// Printed number (`1A`)
    pub number: &'static str,
    /// Canonical title
    pub title: &'static str,
    /// Filing part
    pub part: &'static str,
    /// Expected minimum word count
    pub min_words: usize,
}

/// All canonical 10-K sections.
pub const SECTION_DEFINITIONS: &[SectionDefinition] = &[
    SectionDefinition { id: "item_1", number: "1", title: "Business", part: "Part I", min_words: 1000 },
    SectionDefinition { id: "item_1a", number: "1A", title: "Risk Factors", part: "Part I", min_words: 2000 },
    SectionDefinition { id: "item_1b", number: "1B", title: "Unresolved Staff Comments", part: "Part I", min_words: 10 },
    SectionDefinition { id: "item_1c", number: "1C", title: "Cybersecurity", part: "Part I", min_words: 200 },
    SectionDefinition { id: "item_2", number: "2", title: "Properties", part: "Part I", min_words: 100 },
    SectionDefinition { id: "item_3", number: "3", title: "Legal Proceedings", part: "Part I", min_words: 50 },
    SectionDefinition { id: "item_4", number: "4", title: "Mine Safety Disclosures", part: "Part I", min_words: 10 },
    SectionDefinition { id: "item_5", number: "5", title: "Market for Registrant's Common Equity", part: "Part II", min_words: 200 },
    SectionDefinition { id: "item_6", number: "6", title: "Reserved/Selected Financial Data", part: "Part II", min_words: 10 },
    SectionDefinition { id: "item_7", number: "7", title: "Management's Discussion and Analysis", part: "Part II", min_words: 5000 },
    SectionDefinition { id: "item_7a", number: "7A", title: "Quantitative and Qualitative Disclosures About Market Risk", part: "Part II", min_words: 500 },
    SectionDefinition { id: "item_8", number: "8", title: "Financial Statements and Supplementary Data", part: "Part II", min_words: 10000 },
    SectionDefinition { id: "item_9", number: "9", title: "Changes in and Disagreements with Accountants", part: "Part II", min_words: 50 },
    SectionDefinition { id: "item_9a", number: "9A", title: "Controls and Procedures", part: "Part II", min_words: 500 },
    SectionDefinition { id: "item_9b", number: "9B", title: "Other Information", part: "Part II", min_words: 10 },
    SectionDefinition { id: "item_9c", number: "9C", title: "Disclosure Regarding Foreign Jurisdictions", part: "Part II", min_words: 10 },
    SectionDefinition { id: "item_10", number: "10", title: "Directors, Executive Officers and Corporate Governance", part: "Part III", min_words: 500 },
    SectionDefinition { id: "item_11", number: "11", title: "Executive Compensation", part: "Part III", min_words: 1000 },
    SectionDefinition { id: "item_12", number: "12", title: "Security Ownership of Certain Beneficial Owners and Management", part: "Part III", min_words: 200 },
    SectionDefinition { id: "item_13", number: "13", title: "Certain Relationships and Related Transactions", part: "Part III", min_words: 200 },
    SectionDefinition { id: "item_14", number: "14", title: "Principal Accountant Fees and Services", part: "Part III", min_words: 100 },
    SectionDefinition { id: "item_15", number: "15", title: "Exhibits and Financial Statement Schedules", part: "Part IV", min_words: 100 },
    SectionDefinition { id: "item_16", number: "16", title: "Form 10-K Summary", part: "Part IV", min_words: 10 },
];

/// Sections whose presence drives the overall extraction quality score.
pub const PRIORITY_SECTIONS: &[&str] = &["item_1", "item_1a", "item_7", "item_8", "item_9a"];

/// Look up a canonical section definition by id.
pub fn section_definition(id: &str) -> Option<&'static SectionDefinition> {
    SECTION_DEFINITIONS.iter().find(|d| d.id == id)
}

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:part\s+[IVX]+\s*[-—–]?\s*)?item\s+(\d+[A-C]?)\.?\s*[-—–]?\s*(.*)$",
    )
    .expect("valid regex")
});

static FOOTNOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\*†‡§¶]|\(\d+\)|\[\d+\]").expect("valid regex"));

/// Maximum length for an `UncategorizedText` element to count as a header
/// candidate.
const MAX_HEADER_CANDIDATE_CHARS: usize = 200;

/// Detect whether a partitioned element is a section header.
///
/// Titles always qualify; uncategorized text only when short. Unknown
/// section ids are rejected.
pub fn detect_section_header(element: &PartitionedElement) -> Option<(&'static str, String, String)> {
    match element.category {
        ElementCategory::Title => {}
        ElementCategory::UncategorizedText => {
            if element.text.len() > MAX_HEADER_CANDIDATE_CHARS {
                return None;
            }
        }
        _ => return None,
    }

    let captures = HEADER_RE.captures(element.text.trim())?;
    let number = captures.get(1)?.as_str().to_uppercase();
    let title = captures.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    let id = format!("item_{}", number.to_lowercase());

    let definition = SECTION_DEFINITIONS.iter().find(|d| d.id == id)?;
    Some((definition.id, number, title))
}

/// One group of elements between two section headers.
#[derive(Debug)]
pub struct SectionGroup {
    /// Canonical section id
    pub id: &'static str,
    /// Printed number from the header
    pub number: String,
    /// Title from the header (may be empty)
    pub title: String,
    /// Elements in the group, header included
    pub elements: Vec<PartitionedElement>,
}

impl SectionGroup {
    fn text_len(&self) -> usize {
        self.elements.iter().map(|e| e.text.len()).sum()
    }
}

/// Group elements between detected headers.
///
/// Repeated detections of the same section (tables of contents, running
/// headers) keep the group with the most text.
pub fn group_by_section(elements: &[PartitionedElement]) -> Vec<SectionGroup> {
    let mut groups: Vec<SectionGroup> = Vec::new();
    let mut current: Option<SectionGroup> = None;

    for element in elements {
        if let Some((id, number, title)) = detect_section_header(element) {
            if let Some(finished) = current.take() {
                merge_group(&mut groups, finished);
            }
            current = Some(SectionGroup {
                id,
                number,
                title,
                elements: vec![element.clone()],
            });
        } else if let Some(group) = current.as_mut() {
            group.elements.push(element.clone());
        }
    }
    if let Some(finished) = current.take() {
        merge_group(&mut groups, finished);
    }
    groups
}

fn merge_group(groups: &mut Vec<SectionGroup>, group: SectionGroup) {
    if let Some(existing) = groups.iter_mut().find(|g| g.id == group.id) {
        if group.text_len() > existing.text_len() {
            *existing = group;
        }
    } else {
        groups.push(group);
    }
}

/// Result of full-document markdown extraction.
#[derive(Debug, Clone)]
pub struct FullMarkdownResult {
    /// Complete document markdown with section markers
    pub full_markdown: String,
    /// Detected section ids, in document order
    pub sections_found: Vec<String>,
    /// Word count of the marked markdown
    pub word_count: usize,
    /// Character count of the marked markdown
    pub char_count: usize,
    /// Share of priority sections found, in [0, 1]
    pub extraction_quality: f64,
    /// Accepted sections
    pub sections: Vec<Section>,
}

/// Section extractor with configurable thresholds.
#[derive(Debug, Clone)]
pub struct SectionExtractor {
    config: SectionConfig,
    preserve_html: bool,
}

impl SectionExtractor {
    /// Extractor with the given thresholds.
    pub fn new(config: SectionConfig) -> Self {
        Self { config, preserve_html: false }
    }

    /// Also retain raw table HTML on each section.
    pub fn preserve_html(mut self, preserve: bool) -> Self {
        self.preserve_html = preserve;
        self
    }

    fn min_words_for(&self, id: &str) -> usize {
        section_definition(id).map_or(self.config.min_words, |d| d.min_words)
    }

    /// Extract accepted sections from a primary HTML document.
    pub fn extract_sections(&self, html: &str, accession: &str) -> Vec<Section> {
        let elements = partition_html(html);
        let groups = group_by_section(&elements);
        debug!(accession, groups = groups.len(), "section groups detected");

        groups
            .iter()
            .filter_map(|group| self.build_section(group, accession))
            .collect()
    }

    /// Extract the full document markdown with section markers plus the
    /// accepted sections, in one pass over the partitioned elements.
    pub fn extract_full_markdown(
        &self,
        html: &str,
        accession: &str,
        ticker: &str,
    ) -> FullMarkdownResult {
        let elements = partition_html(html);
        let full_markdown = elements_to_markdown(&elements);
        let groups = group_by_section(&elements);

        let marked = embed_section_markers(&full_markdown, &groups);

        let mut header = String::new();
        if !ticker.is_empty() || !accession.is_empty() {
            header.push_str(&format!("<!-- DOCUMENT: {ticker} 10-K -->\n"));
        }
        if !accession.is_empty() {
            header.push_str(&format!("<!-- ACCESSION: {accession} -->\n"));
        }
        header.push('\n');
        let marked = format!("{header}{marked}");

        let sections: Vec<Section> = groups
            .iter()
            .filter_map(|group| self.build_section(group, accession))
            .collect();

        let sections_found: Vec<String> = groups.iter().map(|g| g.id.to_string()).collect();
        let found_priority = PRIORITY_SECTIONS
            .iter()
            .filter(|p| sections_found.iter().any(|s| s == *p))
            .count();

        FullMarkdownResult {
            word_count: marked.split_whitespace().count(),
            char_count: marked.chars().count(),
            extraction_quality: found_priority as f64 / PRIORITY_SECTIONS.len() as f64,
            full_markdown: marked,
            sections_found,
            sections,
        }
    }

    /// Convert one group into a section record, or discard it as a
    /// table-of-contents artifact when it falls below the candidacy
    /// threshold.
    fn build_section(&self, group: &SectionGroup, accession: &str) -> Option<Section> {
        let definition = section_definition(group.id)?;

        let text_parts: Vec<&str> = group.elements.iter().map(|e| e.text.as_str()).collect();
        let mut content_text = clean_section_text(&text_parts.join("\n\n"));

        let html_parts: Vec<&str> = group
            .elements
            .iter()
            .filter_map(|e| e.html.as_deref())
            .collect();
        let content_html = if self.preserve_html && !html_parts.is_empty() {
            Some(html_parts.join("\n"))
        } else {
            None
        };

        let content_markdown = elements_to_markdown(&group.elements);

        let word_count = content_text.split_whitespace().count();
        let min_words = self.min_words_for(group.id);
        let candidate_floor = (min_words as f64 * self.config.candidacy_threshold) as usize;
        if word_count < candidate_floor.max(1) {
            debug!(section = group.id, word_count, candidate_floor, "section candidate discarded");
            return None;
        }

        let mut confidence = 0.95;
        let mut issues = Vec::new();

        if word_count < min_words {
            issues.push(format!("Section shorter than expected ({word_count} vs {min_words})"));
            confidence *= self.config.short_penalty;
        }
        if content_text.chars().count() > self.config.max_chars {
            content_text = content_text.chars().take(self.config.max_chars).collect();
            confidence *= self.config.truncation_penalty;
            issues.push("Section truncated due to length".to_string());
        }

        let cross_references = extract_cross_references(&content_text);
        let heading_hierarchy = extract_heading_hierarchy(&content_text);
        let footnote_count = FOOTNOTE_RE.find_iter(&content_text).count();

        // Quality: 0.90 base, very-short and missing-reference penalties
        let mut quality = 0.90;
        if word_count < min_words / 2 {
            quality *= 0.7;
        }
        if cross_references.is_empty() && matches!(group.id, "item_7" | "item_8") {
            quality *= 0.95;
        }

        let table_count = group
            .elements
            .iter()
            .filter(|e| e.category == ElementCategory::Table)
            .count();
        let list_count = group
            .elements
            .iter()
            .filter(|e| e.category == ElementCategory::ListItem)
            .count();
        let paragraph_count = group
            .elements
            .iter()
            .filter(|e| e.category == ElementCategory::NarrativeText)
            .count();

        let title = if group.title.is_empty() {
            definition.title.to_string()
        } else {
            group.title.clone()
        };

        Some(Section {
            accession_number: accession.to_string(),
            section_type: group.id.to_string(),
            section_number: group.number.clone(),
            title,
            char_count: content_text.chars().count(),
            word_count,
            paragraph_count,
            content_text,
            content_html,
            content_markdown,
            extraction_confidence: confidence,
            part: Some(definition.part.to_string()),
            table_count,
            list_count,
            footnote_count,
            cross_references,
            heading_hierarchy,
            extraction_quality: quality,
            extraction_issues: issues,
        })
    }
}

/// Normalize section text: collapse blank runs and spaces, strip
/// page-number-only lines and `Form 10-K` running headers.
pub fn clean_section_text(text: &str) -> String {
    static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
    static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
    static PAGE_NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\d+\s*\n").unwrap());
    static TOC_LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\n\s*table\s+of\s+contents\s*\n").unwrap());
    static FORM_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)form\s+10-k\s*\n").unwrap());

    let text = BLANK_RUNS.replace_all(text, "\n\n");
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = PAGE_NUMBERS.replace_all(&text, "\n");
    let text = TOC_LINE.replace_all(&text, "\n");
    let text = FORM_HEADER.replace_all(&text, "");
    text.trim().to_string()
}

/// Extract cross-references (`see Item 7`, `refer to Note 3`, ...) in
/// order, deduplicated.
pub fn extract_cross_references(text: &str) -> Vec<CrossReference> {
    static PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        vec![
            (Regex::new(r"(?i)see\s+item\s+(\d+[A-C]?)").unwrap(), "Item"),
            (Regex::new(r"(?i)refer\s+to\s+item\s+(\d+[A-C]?)").unwrap(), "Item"),
            (Regex::new(r"(?i)discussed\s+in\s+item\s+(\d+[A-C]?)").unwrap(), "Item"),
            (Regex::new(r"(?i)see\s+note\s+(\d+)").unwrap(), "Note"),
            (Regex::new(r"(?i)refer\s+to\s+note\s+(\d+)").unwrap(), "Note"),
            (Regex::new(r"(?i)see\s+part\s+(I{1,3}|IV)\b").unwrap(), "Part"),
            (Regex::new(r"(?i)see\s+table\s+(\d+)").unwrap(), "Table"),
        ]
    });

    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    for (pattern, kind) in PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let target = format!("{} {}", kind, captures.get(1).unwrap().as_str().to_uppercase());
            let matched = captures.get(0).unwrap().as_str().to_string();
            if seen.insert((target.clone(), matched.clone())) {
                refs.push(CrossReference { target, text: matched });
            }
        }
    }
    refs
}

/// First ten heading-looking lines: 5-100 chars, no terminal punctuation,
/// uppercase / title case / colon-terminated, followed by blank or content.
pub fn extract_heading_hierarchy(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut headings = Vec::new();

    for (i, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if line.len() <= 5 || line.len() >= 100 {
            continue;
        }
        if line.ends_with(['.', ',', ';']) {
            continue;
        }
        let is_upper = line.chars().filter(|c| c.is_alphabetic()).count() > 0
            && line.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
        let is_title_case = line
            .split_whitespace()
            .filter(|w| w.chars().next().is_some_and(|c| c.is_alphabetic()))
            .all(|w| w.chars().next().is_some_and(|c| c.is_uppercase()));
        if !(is_upper || is_title_case || line.ends_with(':')) {
            continue;
        }
        let followed_ok = match lines.get(i + 1) {
            Some(next) => next.trim().is_empty() || next.len() > 50,
            None => false,
        };
        if followed_ok {
            headings.push(line.trim_end_matches(':').to_string());
            if headings.len() >= 10 {
                break;
            }
        }
    }
    headings
}

/// Insert `<!-- SECTION: … -->` / `<!-- TITLE: … -->` markers immediately
/// before the first markdown line that opens each detected section.
pub fn embed_section_markers(markdown: &str, groups: &[SectionGroup]) -> String {
    let mut result = markdown.to_string();

    for group in groups {
        let definition = section_definition(group.id);
        let title = if group.title.is_empty() {
            definition.map(|d| d.title).unwrap_or_default().to_string()
        } else {
            group.title.clone()
        };

        let mut marker = format!("\n<!-- SECTION: {} -->\n", group.id);
        if !title.is_empty() {
            marker.push_str(&format!("<!-- TITLE: {title} -->\n"));
        }

        let pattern = Regex::new(&format!(
            r"(?im)^(\s*#*\s*Item\s+{}\b)",
            regex::escape(&group.number)
        ))
        .expect("valid escaped regex");

        if let Some(m) = pattern.find(&result) {
            result.insert_str(m.start(), &marker);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn element(category: ElementCategory, text: &str) -> PartitionedElement {
        PartitionedElement { category, text: text.to_string(), html: None }
    }

    #[rstest]
    #[case("Item 1A. Risk Factors", Some(("item_1a", "1A", "Risk Factors")))]
    #[case("ITEM 7. MANAGEMENT'S DISCUSSION AND ANALYSIS", Some(("item_7", "7", "MANAGEMENT'S DISCUSSION AND ANALYSIS")))]
    #[case("Part II - Item 5. Market for Registrant's Common Equity", Some(("item_5", "5", "Market for Registrant's Common Equity")))]
    #[case("Item 9C — Disclosure Regarding Foreign Jurisdictions", Some(("item_9c", "9C", "Disclosure Regarding Foreign Jurisdictions")))]
    #[case("Item 99. Unknown", None)]
    #[case("This discusses item pricing broadly", None)]
    fn test_detect_section_header(
        #[case] text: &str,
        #[case] expected: Option<(&str, &str, &str)>,
    ) {
        let el = element(ElementCategory::Title, text);
        let detected = detect_section_header(&el);
        match expected {
            Some((id, number, title)) => {
                let (got_id, got_number, got_title) = detected.unwrap();
                assert_eq!(got_id, id);
                assert_eq!(got_number, number);
                assert_eq!(got_title, title);
            }
            None => assert!(detected.is_none()),
        }
    }

    #[test]
    fn test_long_uncategorized_not_header() {
        let long = format!("Item 1. {}", "x".repeat(250));
        let el = element(ElementCategory::UncategorizedText, &long);
        assert!(detect_section_header(&el).is_none());
        // The same text as a Title element still counts
        let el = element(ElementCategory::Title, &long);
        assert!(detect_section_header(&el).is_some());
    }

    #[test]
    fn test_grouping_keeps_longest_duplicate() {
        // A table-of-contents mention followed by the real section
        let elements = vec![
            element(ElementCategory::UncategorizedText, "Item 1A. Risk Factors"),
            element(ElementCategory::UncategorizedText, "12"),
            element(ElementCategory::Title, "Item 1A. Risk Factors"),
            element(ElementCategory::NarrativeText, &"risk ".repeat(300)),
        ];
        let groups = group_by_section(&elements);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].text_len() > 1000);
    }

    #[test]
    fn test_toc_only_document_yields_no_sections() {
        // Sparse candidates below the 0.1 x min_words floor are discarded
        let elements = vec![
            element(ElementCategory::UncategorizedText, "Item 1. Business"),
            element(ElementCategory::UncategorizedText, "3"),
            element(ElementCategory::UncategorizedText, "Item 1A. Risk Factors"),
            element(ElementCategory::UncategorizedText, "12"),
        ];
        let groups = group_by_section(&elements);
        let extractor = SectionExtractor::new(SectionConfig::default());
        let sections: Vec<Section> = groups
            .iter()
            .filter_map(|g| extractor.build_section(g, "acc"))
            .collect();
        assert!(sections.is_empty());
    }

    #[test]
    fn test_build_section_penalties() {
        let short_body = "word ".repeat(250); // 250 words < 2000 expected for item_1a
        let elements = vec![
            element(ElementCategory::Title, "Item 1A. Risk Factors"),
            element(ElementCategory::NarrativeText, &short_body),
        ];
        let groups = group_by_section(&elements);
        let extractor = SectionExtractor::new(SectionConfig::default());
        let section = extractor.build_section(&groups[0], "acc").unwrap();

        assert_eq!(section.section_type, "item_1a");
        assert!(section.extraction_confidence < 0.95);
        assert!(!section.extraction_issues.is_empty());
        // 250 words < 1000 (half of min) triggers the very-short quality penalty
        assert!((section.extraction_quality - 0.90 * 0.7).abs() < 1e-9);
        assert_eq!(section.part.as_deref(), Some("Part I"));
    }

    #[test]
    fn test_cross_references() {
        let refs = extract_cross_references(
            "See Item 7A for market risk. Refer to Note 12. See Part II. See Item 7A again.",
        );
        let targets: Vec<&str> = refs.iter().map(|r| r.target.as_str()).collect();
        assert!(targets.contains(&"Item 7A"));
        assert!(targets.contains(&"Note 12"));
        assert!(targets.contains(&"Part II"));
        // Deduplicated
        assert_eq!(targets.iter().filter(|t| **t == "Item 7A").count(), 1);
    }

    #[test]
    fn test_heading_hierarchy() {
        let text = "OVERVIEW\n\nA long paragraph about the business follows here with details that run on.\nProducts and Services:\n\nMore content in this paragraph which is also long enough to count as body text.\nshort.\n";
        let headings = extract_heading_hierarchy(text);
        assert!(headings.contains(&"OVERVIEW".to_string()));
        assert!(headings.contains(&"Products and Services".to_string()));
        assert!(!headings.iter().any(|h| h == "short"));
    }

    #[test]
    fn test_full_markdown_has_markers() {
        let body = "business ".repeat(200);
        let html = format!(
            "<html><body><div><b>Item 1. Business</b></div><p>{body}</p></body></html>"
        );
        let extractor = SectionExtractor::new(SectionConfig::default());
        let result = extractor.extract_full_markdown(&html, "0000320193-24-000123", "AAPL");

        assert!(result.full_markdown.contains("<!-- DOCUMENT: AAPL 10-K -->"));
        assert!(result.full_markdown.contains("<!-- ACCESSION: 0000320193-24-000123 -->"));
        assert!(result.full_markdown.contains("<!-- SECTION: item_1 -->"));
        let marker_pos = result.full_markdown.find("<!-- SECTION: item_1 -->").unwrap();
        let header_pos = result.full_markdown.find("## Item 1. Business").unwrap();
        assert!(marker_pos < header_pos);
        assert_eq!(result.sections_found, vec!["item_1"]);
        assert_eq!(result.extraction_quality, 0.2); // 1 of 5 priority sections
    }

    #[test]
    fn test_clean_section_text() {
        let cleaned = clean_section_text("Text\n\n\n\nMore   text\n 42 \nForm 10-K\nEnd");
        assert!(!cleaned.contains("Form 10-K"));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(!cleaned.contains("   "));
    }

    #[test]
    fn test_reextraction_is_deterministic() {
        let body = "business ".repeat(400);
        let html = format!(
            "<html><body><div><b>Item 1. Business</b></div><p>{body}</p></body></html>"
        );
        let extractor = SectionExtractor::new(SectionConfig::default());
        let a = extractor.extract_sections(&html, "acc");
        let b = extractor.extract_sections(&html, "acc");
        let tuples_a: Vec<(String, usize)> =
            a.iter().map(|s| (s.section_type.clone(), s.word_count)).collect();
        let tuples_b: Vec<(String, usize)> =
            b.iter().map(|s| (s.section_type.clone(), s.word_count)).collect();
        assert_eq!(tuples_a, tuples_b);
    }
}
