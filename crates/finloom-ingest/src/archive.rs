//! Typed client for the filing archive's JSON endpoints.
//!
//! Wraps the submissions endpoint (parallel filing arrays plus shard files
//! for long histories), the per-filing directory listing, and raw document
//! fetches. Every request passes through the shared [`RateGovernor`] and is
//! retried with exponential backoff on transient statuses.

use crate::governor::SharedGovernor;
use chrono::{DateTime, NaiveDate, Utc};
use finloom::error::{FinloomError, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const DATA_BASE_URL: &str = "https://data.sec.gov";
const ARCHIVES_BASE_URL: &str = "https://www.sec.gov";

/// Statuses retried with backoff.
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Company metadata and filing history from the submissions endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submissions {
    /// CIK as returned (unpadded)
    pub cik: String,
    /// Registrant name
    pub name: String,
    /// Tickers, when listed
    #[serde(default)]
    pub tickers: Vec<String>,
    /// SIC code
    #[serde(default)]
    pub sic: Option<String>,
    /// SIC description
    #[serde(default)]
    pub sic_description: Option<String>,
    /// State of incorporation
    #[serde(default)]
    pub state_of_incorporation: Option<String>,
    /// Fiscal year end (MMDD)
    #[serde(default)]
    pub fiscal_year_end: Option<String>,
    /// Employer identification number
    #[serde(default)]
    pub ein: Option<String>,
    /// Filing history
    pub filings: FilingsContainer,
}

/// Container for the recent arrays and older-history shard descriptors.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingsContainer {
    /// Most recent filings as parallel arrays
    pub recent: FilingArrays,
    /// Additional shard files for companies with long histories
    #[serde(default)]
    pub files: Vec<ShardFile>,
}

/// Descriptor of one older-history shard file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardFile {
    /// Shard filename under the submissions endpoint
    pub name: String,
    /// Number of filings in the shard
    #[serde(default)]
    pub filing_count: Option<u64>,
}

/// Parallel filing arrays, keyed by index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingArrays {
    /// Accession numbers
    #[serde(default)]
    pub accession_number: Vec<String>,
    /// Form types
    #[serde(default)]
    pub form: Vec<String>,
    /// Filing dates (ISO)
    #[serde(default)]
    pub filing_date: Vec<String>,
    /// Period-of-report dates (ISO, may be empty)
    #[serde(default)]
    pub report_date: Vec<String>,
    /// Acceptance timestamps (ISO)
    #[serde(default)]
    pub acceptance_date_time: Vec<String>,
    /// Primary document names
    #[serde(default)]
    pub primary_document: Vec<String>,
    /// Primary document descriptions
    #[serde(default)]
    pub primary_doc_description: Vec<String>,
    /// Classic-XBRL flags (0/1)
    #[serde(default, rename = "isXBRL")]
    pub is_xbrl: Vec<u8>,
    /// Inline-XBRL flags (0/1)
    #[serde(default, rename = "isInlineXBRL")]
    pub is_inline_xbrl: Vec<u8>,
}

/// One filing flattened out of the parallel arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct FilingDescriptor {
    /// Accession number
    pub accession_number: String,
    /// Form type
    pub form_type: String,
    /// Filing date
    pub filing_date: NaiveDate,
    /// Period of report
    pub report_date: Option<NaiveDate>,
    /// Acceptance timestamp
    pub acceptance_datetime: Option<DateTime<Utc>>,
    /// Primary document name
    pub primary_document: Option<String>,
    /// Primary document description
    pub primary_doc_description: Option<String>,
    /// Classic XBRL attached
    pub is_xbrl: bool,
    /// Inline XBRL
    pub is_inline_xbrl: bool,
}

/// Directory listing of one filing.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingIndex {
    /// Directory payload
    pub directory: FilingDirectory,
}

/// Directory payload of the per-filing `index.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilingDirectory {
    /// Files in the filing directory
    #[serde(default)]
    pub item: Vec<DocumentEntry>,
}

/// One file in a filing directory.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DocumentEntry {
    /// Filename
    pub name: String,
    /// Archive-reported type
    #[serde(default, rename = "type")]
    pub doc_type: String,
    /// Size in bytes (the archive reports a string, possibly empty)
    #[serde(default)]
    pub size: String,
    /// Last-modified timestamp
    #[serde(default, rename = "last-modified")]
    pub last_modified: String,
}

impl DocumentEntry {
    /// Parsed size, when the archive reported one.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.parse().ok()
    }
}

/// Client for the filing archive.
pub struct ArchiveClient {
    client: reqwest::Client,
    governor: SharedGovernor,
    data_base_url: String,
    archives_base_url: String,
    max_retries: u32,
    backoff_initial: Duration,
}

impl std::fmt::Debug for ArchiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveClient")
            .field("data_base_url", &self.data_base_url)
            .field("archives_base_url", &self.archives_base_url)
            .finish_non_exhaustive()
    }
}

impl ArchiveClient {
    /// Create a client with a mandatory descriptive User-Agent.
    ///
    /// # Errors
    /// Returns `MissingConfig` for a blank User-Agent; the archive rejects
    /// anonymous traffic.
    pub fn new(user_agent: &str, governor: SharedGovernor) -> Result<Self> {
        Self::with_timeouts(user_agent, governor, Duration::from_secs(30), 5, Duration::from_millis(1000))
    }

    /// Create a client with explicit timeout and retry settings.
    pub fn with_timeouts(
        user_agent: &str,
        governor: SharedGovernor,
        timeout: Duration,
        max_retries: u32,
        backoff_initial: Duration,
    ) -> Result<Self> {
        if user_agent.trim().is_empty() {
            return Err(FinloomError::MissingConfig("archive user agent".to_string()));
        }
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FinloomError::Network)?;

        Ok(Self {
            client,
            governor,
            data_base_url: DATA_BASE_URL.to_string(),
            archives_base_url: ARCHIVES_BASE_URL.to_string(),
            max_retries,
            backoff_initial,
        })
    }

    /// Point the client at alternate base URLs (mock servers in tests).
    pub fn with_base_urls(mut self, data: &str, archives: &str) -> Self {
        self.data_base_url = data.trim_end_matches('/').to_string();
        self.archives_base_url = archives.trim_end_matches('/').to_string();
        self
    }

    /// GET with governor pacing and bounded retry on transient statuses.
    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            self.governor.wait().await;
            let response = self.client.get(url).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        self.governor.report_success().await;
                        return Ok(resp);
                    }
                    if status == 429 {
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs);
                        self.governor.report_rate_limit(retry_after).await;
                        if attempt >= self.max_retries {
                            return Err(FinloomError::RateLimited { retry_after });
                        }
                    } else if RETRYABLE_STATUSES.contains(&status) {
                        if attempt >= self.max_retries {
                            return Err(FinloomError::ArchiveApi(format!(
                                "HTTP {status} fetching {url}"
                            )));
                        }
                    } else {
                        return Err(FinloomError::ArchiveApi(format!(
                            "HTTP {status} fetching {url}"
                        )));
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries || !(e.is_timeout() || e.is_connect()) {
                        return Err(FinloomError::Network(e));
                    }
                }
            }

            let backoff = self.backoff_initial * 2u32.pow(attempt.min(6));
            warn!(url, attempt, backoff_ms = backoff.as_millis() as u64, "retrying archive request");
            sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Fetch a company's submissions: metadata plus the recent-filings
    /// parallel arrays and shard descriptors.
    pub async fn get_submissions(&self, cik: &str) -> Result<Submissions> {
        let cik_padded = finloom::types::Company::pad_cik(cik);
        let url = format!("{}/submissions/CIK{}.json", self.data_base_url, cik_padded);
        let resp = self.get(&url).await?;
        resp.json().await.map_err(FinloomError::Network)
    }

    /// Fetch one older-history shard by name.
    async fn get_shard(&self, name: &str) -> Result<FilingArrays> {
        let url = format!("{}/submissions/{}", self.data_base_url, name);
        let resp = self.get(&url).await?;
        resp.json().await.map_err(FinloomError::Network)
    }

    /// List a company's filings of `form_type` within the optional date
    /// range, newest first.
    ///
    /// Merges every shard file so long histories are complete. Shard fetch
    /// failures are logged and skipped; the recent window is authoritative.
    pub async fn get_company_filings(
        &self,
        cik: &str,
        form_type: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<FilingDescriptor>> {
        let submissions = self.get_submissions(cik).await?;

        let mut filings = flatten_arrays(&submissions.filings.recent, form_type, start_date, end_date);

        for shard in &submissions.filings.files {
            match self.get_shard(&shard.name).await {
                Ok(arrays) => {
                    filings.extend(flatten_arrays(&arrays, form_type, start_date, end_date));
                }
                Err(e) => warn!(shard = %shard.name, error = %e, "failed to fetch filings shard"),
            }
        }

        filings.sort_by(|a, b| b.filing_date.cmp(&a.filing_date));
        debug!(cik, form_type, count = filings.len(), "company filings listed");
        Ok(filings)
    }

    /// Directory listing (name, type, size, last-modified) of one filing.
    pub async fn get_filing_documents(&self, cik: &str, accession: &str) -> Result<Vec<DocumentEntry>> {
        let url = format!(
            "{}/Archives/edgar/data/{}/{}/index.json",
            self.archives_base_url,
            strip_leading_zeros(cik),
            accession.replace('-', "")
        );
        let resp = self.get(&url).await?;
        let index: FilingIndex = resp.json().await.map_err(FinloomError::Network)?;
        Ok(index.directory.item)
    }

    /// Fetch one raw document from a filing directory.
    pub async fn fetch_document(&self, cik: &str, accession: &str, name: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/Archives/edgar/data/{}/{}/{}",
            self.archives_base_url,
            strip_leading_zeros(cik),
            accession.replace('-', ""),
            name
        );
        let resp = self.get(&url).await?;
        let bytes = resp.bytes().await.map_err(|e| FinloomError::Download {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Flatten the parallel arrays into descriptors, filtering by form and date.
fn flatten_arrays(
    arrays: &FilingArrays,
    form_type: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Vec<FilingDescriptor> {
    let n = arrays.accession_number.len();
    let mut out = Vec::new();

    for i in 0..n {
        let form = arrays.form.get(i).map(String::as_str).unwrap_or_default();
        if !form_matches(form, form_type) {
            continue;
        }
        let Some(filing_date) = arrays
            .filing_date
            .get(i)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if start_date.is_some_and(|s| filing_date < s) || end_date.is_some_and(|e| filing_date > e) {
            continue;
        }

        out.push(FilingDescriptor {
            accession_number: arrays.accession_number[i].clone(),
            form_type: form.to_string(),
            filing_date,
            report_date: arrays
                .report_date
                .get(i)
                .filter(|d| !d.is_empty())
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            acceptance_datetime: arrays
                .acceptance_date_time
                .get(i)
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            primary_document: arrays.primary_document.get(i).filter(|d| !d.is_empty()).cloned(),
            primary_doc_description: arrays
                .primary_doc_description
                .get(i)
                .filter(|d| !d.is_empty())
                .cloned(),
            is_xbrl: arrays.is_xbrl.get(i).copied().unwrap_or(0) == 1,
            is_inline_xbrl: arrays.is_inline_xbrl.get(i).copied().unwrap_or(0) == 1,
        });
    }
    out
}

/// A `10-K` request also matches amendments (`10-K/A`); an explicit
/// amendment request matches only amendments.
fn form_matches(form: &str, requested: &str) -> bool {
    form == requested || (!requested.ends_with("/A") && form == format!("{requested}/A"))
}

/// Document URLs use the numeric CIK without left padding.
fn strip_leading_zeros(cik: &str) -> &str {
    let trimmed = cik.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_arrays() -> FilingArrays {
        FilingArrays {
            accession_number: vec![
                "0000320193-24-000123".to_string(),
                "0000320193-23-000106".to_string(),
                "0000320193-23-000090".to_string(),
            ],
            form: vec!["10-K".to_string(), "10-K/A".to_string(), "8-K".to_string()],
            filing_date: vec![
                "2024-11-01".to_string(),
                "2023-11-03".to_string(),
                "2023-08-04".to_string(),
            ],
            report_date: vec!["2024-09-28".to_string(), "2023-09-30".to_string(), String::new()],
            acceptance_date_time: vec![
                "2024-11-01T06:01:36.000Z".to_string(),
                "2023-11-03T06:08:27.000Z".to_string(),
                "2023-08-04T06:01:36.000Z".to_string(),
            ],
            primary_document: vec![
                "aapl-20240928.htm".to_string(),
                "aapl-20230930.htm".to_string(),
                "aapl-8k.htm".to_string(),
            ],
            primary_doc_description: vec!["10-K".to_string(), "10-K/A".to_string(), "8-K".to_string()],
            is_xbrl: vec![1, 1, 0],
            is_inline_xbrl: vec![1, 1, 0],
        }
    }

    #[test]
    fn test_flatten_filters_form_type() {
        let filings = flatten_arrays(&sample_arrays(), "10-K", None, None);
        // 10-K and its amendment match; the 8-K does not
        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].form_type, "10-K");
        assert_eq!(filings[1].form_type, "10-K/A");
    }

    #[test]
    fn test_flatten_amendment_only_request() {
        let filings = flatten_arrays(&sample_arrays(), "10-K/A", None, None);
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].form_type, "10-K/A");
    }

    #[test]
    fn test_flatten_date_range() {
        let filings = flatten_arrays(
            &sample_arrays(),
            "10-K",
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            None,
        );
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].accession_number, "0000320193-24-000123");
    }

    #[test]
    fn test_flatten_parses_fields() {
        let filings = flatten_arrays(&sample_arrays(), "10-K", None, None);
        let first = &filings[0];
        assert!(first.is_xbrl);
        assert!(first.is_inline_xbrl);
        assert_eq!(first.report_date, NaiveDate::from_ymd_opt(2024, 9, 28));
        assert!(first.acceptance_datetime.is_some());
        assert_eq!(first.primary_document.as_deref(), Some("aapl-20240928.htm"));
    }

    #[test]
    fn test_strip_leading_zeros() {
        assert_eq!(strip_leading_zeros("0000320193"), "320193");
        assert_eq!(strip_leading_zeros("320193"), "320193");
        assert_eq!(strip_leading_zeros("0000000000"), "0");
    }

    #[test]
    fn test_document_entry_size() {
        let entry = DocumentEntry {
            name: "a.htm".to_string(),
            doc_type: "10-K".to_string(),
            size: "12345".to_string(),
            last_modified: String::new(),
        };
        assert_eq!(entry.size_bytes(), Some(12345));

        let blank = DocumentEntry { size: String::new(), ..entry };
        assert_eq!(blank.size_bytes(), None);
    }

    #[test]
    fn test_submissions_deserializes() {
        let json = r#"{
            "cik": "320193",
            "name": "Apple Inc.",
            "tickers": ["AAPL"],
            "sic": "3571",
            "sicDescription": "Electronic Computers",
            "stateOfIncorporation": "CA",
            "fiscalYearEnd": "0928",
            "ein": "942404110",
            "filings": {
                "recent": {
                    "accessionNumber": ["0000320193-24-000123"],
                    "form": ["10-K"],
                    "filingDate": ["2024-11-01"],
                    "reportDate": ["2024-09-28"],
                    "acceptanceDateTime": ["2024-11-01T06:01:36.000Z"],
                    "primaryDocument": ["aapl-20240928.htm"],
                    "primaryDocDescription": ["10-K"],
                    "isXBRL": [1],
                    "isInlineXBRL": [1]
                },
                "files": [
                    {"name": "CIK0000320193-submissions-001.json", "filingCount": 1000}
                ]
            }
        }"#;
        let submissions: Submissions = serde_json::from_str(json).unwrap();
        assert_eq!(submissions.name, "Apple Inc.");
        assert_eq!(submissions.filings.recent.accession_number.len(), 1);
        assert_eq!(submissions.filings.files.len(), 1);
    }
}
