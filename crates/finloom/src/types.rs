//! Core record types for companies, filings, facts, sections and chunks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A public company tracked by the roster.
///
/// Identified by its 10-digit zero-padded CIK. Immutable after creation
/// except for metadata refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// 10-digit zero-padded Central Index Key
    pub cik: String,
    /// Registrant name
    pub name: String,
    /// Ticker symbol, when listed
    pub ticker: Option<String>,
    /// Standard Industrial Classification code
    pub sic_code: Option<String>,
    /// SIC description
    pub sic_description: Option<String>,
    /// State of incorporation
    pub state_of_incorporation: Option<String>,
    /// Fiscal year end (MMDD)
    pub fiscal_year_end: Option<String>,
    /// Employer identification number
    pub ein: Option<String>,
}

impl Company {
    /// Pad a CIK to the canonical 10-digit form.
    pub fn pad_cik(cik: &str) -> String {
        format!("{:0>10}", cik)
    }
}

/// Download lifecycle of a filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Discovered but not yet downloaded
    Pending,
    /// All filtered documents fetched and verified
    Completed,
    /// Download failed; error recorded in the processing log
    Failed,
}

impl DownloadStatus {
    /// Database string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single annual filing (10-K or amendment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    /// Accession number (`NNNNNNNNNN-YY-NNNNNN`)
    pub accession_number: String,
    /// Owning company's CIK
    pub cik: String,
    /// Form type (`10-K`, `10-K/A`, ...)
    pub form_type: String,
    /// Date the filing was submitted
    pub filing_date: NaiveDate,
    /// Fiscal period end the filing reports on
    pub period_of_report: Option<NaiveDate>,
    /// Acceptance timestamp at the archive
    pub acceptance_datetime: Option<DateTime<Utc>>,
    /// Primary document filename
    pub primary_document: Option<String>,
    /// Primary document description
    pub primary_doc_description: Option<String>,
    /// Classic XBRL instance attached
    pub is_xbrl: bool,
    /// Facts embedded inline in the HTML
    pub is_inline_xbrl: bool,
    /// Local directory the documents were downloaded to
    pub local_path: Option<PathBuf>,
    /// Download lifecycle state
    pub download_status: DownloadStatus,
    /// XBRL facts have been parsed and stored
    pub xbrl_processed: bool,
    /// Sections have been extracted and stored
    pub sections_processed: bool,
    /// Full-document markdown with section markers, once extracted
    pub full_markdown: Option<String>,
}

impl Filing {
    /// True for amendment forms (`10-K/A` and friends).
    pub fn is_amendment(&self) -> bool {
        self.form_type.ends_with("/A")
    }

    /// Accession number without dashes, as used in archive URLs and paths.
    pub fn accession_no_dashes(&self) -> String {
        self.accession_number.replace('-', "")
    }
}

/// Typed value of an XBRL fact.
///
/// A fact is numeric, textual, or reported with no usable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FactValue {
    /// Numeric observation
    Numeric(f64),
    /// Textual observation
    Text(String),
    /// Reported without a usable value
    Missing,
}

impl FactValue {
    /// Numeric value, when this fact is numeric.
    pub const fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, when this fact is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Period shape of a fact's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Point-in-time (balance sheet)
    Instant,
    /// Span (income statement, cash flow)
    Duration,
    /// Context could not be resolved
    Unknown,
}

impl PeriodType {
    /// Database string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Duration => "duration",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Self {
        match s {
            "instant" => Self::Instant,
            "duration" => Self::Duration,
            _ => Self::Unknown,
        }
    }
}

/// A single XBRL-reported observation.
///
/// Uniqueness is enforced on `(accession_number, concept_qname,
/// period_end, dimensions)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Surrogate row id, populated once stored
    pub id: Option<i64>,
    /// Accession number of the reporting filing
    pub accession_number: String,
    /// Standardized namespace prefix (`us-gaap`, `dei`, `xbrli`, or empty)
    pub concept_namespace: String,
    /// Local concept name
    pub concept_local: String,
    /// Qualified name (`us-gaap:Assets`)
    pub concept_qname: String,
    /// Typed value
    pub value: FactValue,
    /// Unit local name (`USD`, `shares`)
    pub unit: Option<String>,
    /// Decimals of precision as reported
    pub decimals: Option<i32>,
    /// Period shape
    pub period_type: PeriodType,
    /// Period start (duration facts)
    pub period_start: Option<NaiveDate>,
    /// Period end (or instant)
    pub period_end: Option<NaiveDate>,
    /// Hypercube dimensions, ordered for stable serialization
    pub dimensions: Option<BTreeMap<String, String>>,
    /// Concept lies outside the standard taxonomy
    pub is_custom: bool,
    /// Statement section from the presentation linkbase
    pub section: Option<String>,
    /// Parent concept from the presentation linkbase
    pub parent_concept: Option<String>,
    /// Depth in the presentation hierarchy
    pub depth: Option<i32>,
    /// Human label from the label linkbase
    pub label: Option<String>,
}

impl Fact {
    /// Dimensions as a canonical JSON string (`None` for dimensionless facts).
    ///
    /// `BTreeMap` ordering keeps the string stable across parses, which the
    /// store's dedup key relies on.
    pub fn dimensions_json(&self) -> Option<String> {
        self.dimensions
            .as_ref()
            .filter(|d| !d.is_empty())
            .map(|d| serde_json::to_string(d).unwrap_or_default())
    }
}

/// One cross-reference found in section text (`see Item 7`, `see Note 3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Referenced target (`Item 7`, `Note 3`, `Part II`)
    pub target: String,
    /// Matched text
    pub text: String,
}

/// An extracted part of a filing, identified by
/// `(accession_number, section_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Owning filing
    pub accession_number: String,
    /// Canonical section id (`item_1a`)
    pub section_type: String,
    /// Section number as printed (`1A`)
    pub section_number: String,
    /// Section title
    pub title: String,
    /// Cleaned plain text
    pub content_text: String,
    /// Raw table HTML, when preservation was requested
    pub content_html: Option<String>,
    /// Markdown rendering
    pub content_markdown: String,
    /// Word count of the cleaned text
    pub word_count: usize,
    /// Character count of the cleaned text
    pub char_count: usize,
    /// Paragraph count
    pub paragraph_count: usize,
    /// Extraction confidence in [0, 1]
    pub extraction_confidence: f64,
    /// Filing part (`Part I` ... `Part IV`)
    pub part: Option<String>,
    /// Tables contained
    pub table_count: usize,
    /// List items contained
    pub list_count: usize,
    /// Footnote markers contained
    pub footnote_count: usize,
    /// Cross-references to other sections/notes/parts
    pub cross_references: Vec<CrossReference>,
    /// First headings found in the text
    pub heading_hierarchy: Vec<String>,
    /// Extraction quality score in [0, 1]
    pub extraction_quality: f64,
    /// Issues noted during extraction
    pub extraction_issues: Vec<String>,
}

/// Cached classification of a concept from linkbase parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCategory {
    /// Qualified concept name
    pub concept_name: String,
    /// Statement section (`IncomeStatement`, `BalanceSheet`, ...)
    pub section: Option<String>,
    /// Parent concept in the presentation tree
    pub parent_concept: Option<String>,
    /// Depth in the presentation tree
    pub depth: Option<i32>,
    /// Human label
    pub label: Option<String>,
    /// Data type hint
    pub data_type: Option<String>,
}

/// A canonical metric in the standardized taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedMetric {
    /// Stable metric id (`revenue`, `total_assets`)
    pub metric_id: String,
    /// Display label
    pub label: String,
    /// Category (`income_statement`, `balance_sheet`, ...)
    pub category: String,
    /// Data type (`monetary`, `per_share`, ...)
    pub data_type: String,
    /// Description
    pub description: Option<String>,
    /// Optional derivation rule for computed metrics
    pub calculation: Option<String>,
}

/// Maps a vendor concept onto a canonical metric.
///
/// Lower `priority` is preferred. Unique on `(metric_id, concept_name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMapping {
    /// Canonical metric id
    pub metric_id: String,
    /// Qualified concept name
    pub concept_name: String,
    /// Preference order (1 = best)
    pub priority: i32,
    /// Mapping confidence in [0, 1]
    pub confidence: f64,
    /// Restrict the mapping to an industry (SIC prefix), when set
    pub industry_filter: Option<String>,
}

/// A canonical metric value resolved for one company-period.
///
/// Unique on `(ticker, fiscal_year, fiscal_quarter, metric_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFinancial {
    /// Company ticker
    pub company_ticker: String,
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal quarter (None for annual)
    pub fiscal_quarter: Option<i32>,
    /// Canonical metric id
    pub metric_id: String,
    /// Resolved value
    pub value: f64,
    /// Concept the value came from
    pub source_concept: String,
    /// Filing the value came from
    pub source_accession: Option<String>,
    /// Resolution confidence in [0, 1]
    pub confidence: f64,
}

/// A retrievable text passage carved out of a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable chunk id
    pub chunk_id: String,
    /// Originating filing
    pub accession_number: String,
    /// Section item id (`item_1a`)
    pub section_item: String,
    /// Section title
    pub section_title: String,
    /// Position within the filing
    pub chunk_index: usize,
    /// Token count
    pub token_count: usize,
    /// Character offset of the chunk start within the section
    pub char_start: usize,
    /// Character offset of the chunk end within the section
    pub char_end: usize,
    /// Chunk text
    pub text: String,
    /// Chunk contains table content
    pub contains_tables: bool,
    /// Chunk contains list items
    pub contains_lists: bool,
    /// Chunk contains numeric content
    pub contains_numbers: bool,
    /// Embedding vector, once computed
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// 200-character preview carried in graph payloads instead of full text.
    pub fn text_preview(&self) -> String {
        self.text.chars().take(200).collect()
    }
}

/// Metadata attached to a search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    /// Chunk id, when the hit maps to an indexed chunk
    pub chunk_id: Option<String>,
    /// Company ticker
    pub ticker: Option<String>,
    /// Company name
    pub company_name: Option<String>,
    /// Section item id
    pub section_item: Option<String>,
    /// Section title
    pub section_title: Option<String>,
    /// Filing date (ISO)
    pub filing_date: Option<String>,
    /// Accession number
    pub accession_number: Option<String>,
    /// Fiscal year
    pub fiscal_year: Option<i32>,
    /// Retrieval primitives that contributed this hit
    pub sources: Vec<String>,
    /// Hop at which the passage was admitted (0 = seed)
    pub hop_number: u32,
    /// Edge type that led to this passage, for hop > 0
    pub edge_type: Option<String>,
}

/// Uniform result row returned by every search primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Merge key: chunk id, or a synthetic key for graph rows
    pub key: String,
    /// Passage content (full text, or a preview until enrichment)
    pub content: String,
    /// Fused relevance score
    pub score: f64,
    /// Hit metadata
    pub metadata: HitMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_cik() {
        assert_eq!(Company::pad_cik("320193"), "0000320193");
        assert_eq!(Company::pad_cik("0000320193"), "0000320193");
    }

    #[test]
    fn test_amendment_detection() {
        let mut filing = sample_filing();
        assert!(!filing.is_amendment());
        filing.form_type = "10-K/A".to_string();
        assert!(filing.is_amendment());
    }

    #[test]
    fn test_accession_no_dashes() {
        let filing = sample_filing();
        assert_eq!(filing.accession_no_dashes(), "000032019324000001");
    }

    #[test]
    fn test_fact_value_accessors() {
        assert_eq!(FactValue::Numeric(1.5).as_numeric(), Some(1.5));
        assert_eq!(FactValue::Text("x".into()).as_numeric(), None);
        assert_eq!(FactValue::Text("x".into()).as_text(), Some("x"));
        assert_eq!(FactValue::Missing.as_numeric(), None);
    }

    #[test]
    fn test_dimensions_json_stable() {
        let mut fact = sample_fact();
        let mut dims = BTreeMap::new();
        dims.insert("srt:ProductOrServiceAxis".to_string(), "ProductMember".to_string());
        dims.insert("srt:GeographyAxis".to_string(), "US".to_string());
        fact.dimensions = Some(dims);

        let json = fact.dimensions_json().unwrap();
        // BTreeMap sorts keys, so geography comes first regardless of insert order
        assert!(json.find("GeographyAxis").unwrap() < json.find("ProductOrServiceAxis").unwrap());
    }

    #[test]
    fn test_dimensions_json_empty_is_none() {
        let mut fact = sample_fact();
        fact.dimensions = Some(BTreeMap::new());
        assert!(fact.dimensions_json().is_none());
        fact.dimensions = None;
        assert!(fact.dimensions_json().is_none());
    }

    #[test]
    fn test_chunk_preview_truncates() {
        let mut chunk = sample_chunk();
        chunk.text = "a".repeat(500);
        assert_eq!(chunk.text_preview().len(), 200);
    }

    fn sample_filing() -> Filing {
        Filing {
            accession_number: "0000320193-24-000001".to_string(),
            cik: "0000320193".to_string(),
            form_type: "10-K".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            period_of_report: Some(NaiveDate::from_ymd_opt(2024, 9, 28).unwrap()),
            acceptance_datetime: None,
            primary_document: Some("aapl-20240928.htm".to_string()),
            primary_doc_description: Some("10-K".to_string()),
            is_xbrl: true,
            is_inline_xbrl: true,
            local_path: None,
            download_status: DownloadStatus::Pending,
            xbrl_processed: false,
            sections_processed: false,
            full_markdown: None,
        }
    }

    fn sample_fact() -> Fact {
        Fact {
            id: None,
            accession_number: "0000320193-24-000001".to_string(),
            concept_namespace: "us-gaap".to_string(),
            concept_local: "Assets".to_string(),
            concept_qname: "us-gaap:Assets".to_string(),
            value: FactValue::Numeric(352_583_000_000.0),
            unit: Some("USD".to_string()),
            decimals: Some(-6),
            period_type: PeriodType::Instant,
            period_start: None,
            period_end: NaiveDate::from_ymd_opt(2023, 12, 31),
            dimensions: None,
            is_custom: false,
            section: None,
            parent_concept: None,
            depth: None,
            label: None,
        }
    }

    fn sample_chunk() -> Chunk {
        Chunk {
            chunk_id: "0000320193-24-000001_item_1a_0".to_string(),
            accession_number: "0000320193-24-000001".to_string(),
            section_item: "item_1a".to_string(),
            section_title: "Risk Factors".to_string(),
            chunk_index: 0,
            token_count: 100,
            char_start: 0,
            char_end: 400,
            text: "Risk factors text".to_string(),
            contains_tables: false,
            contains_lists: false,
            contains_numbers: false,
            embedding: None,
        }
    }
}
