//! Resumable, checkpointed download of filing document sets.
//!
//! Each filing lands in `{root}/{year}/{cik}/{accession_no_dashes}/` with a
//! `metadata.json` and the filtered document set. The per-company driver
//! persists its checkpoint after every filing, so an interrupted run resumes
//! at exactly the next filing without re-fetching completed ones.

use crate::archive::{ArchiveClient, DocumentEntry, FilingDescriptor};
use crate::checkpoint::DownloadCheckpoint;
use chrono::{Datelike, NaiveDate, Utc};
use finloom::error::Result;
use finloom::types::{Company, DownloadStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{info, warn};

/// XBRL linkbase filename suffixes.
const LINKBASE_SUFFIXES: &[&str] = &["_cal.xml", "_def.xml", "_lab.xml", "_pre.xml"];

/// Graphic extensions never worth storing.
const GRAPHIC_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".gif", ".png", ".ico"];

/// Spreadsheet exports, redundant with the XBRL instance.
const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls"];

/// Name fragments that mark index or viewer artifacts.
const EXCLUDED_FRAGMENTS: &[&str] = &["filingsummary", "financial_report", "defref"];

static REPORT_VIEW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^r\d+\.htm$").expect("valid regex"));

/// Decide whether a document in the filing directory is worth fetching.
///
/// Keep iff the file is the primary document, an XBRL linkbase, a schema,
/// or the XBRL instance. Per-report HTML views, exhibits, viewer artifacts,
/// graphics and spreadsheets are always dropped.
pub fn should_download(name: &str, primary_document: Option<&str>) -> bool {
    let lower = name.to_lowercase();

    if REPORT_VIEW_RE.is_match(&lower) {
        return false;
    }
    if lower.starts_with("ex") || lower.starts_with("exhibit") {
        // Primary documents occasionally start with "ex" in the ticker; the
        // primary match below would have caught them first
        if !primary_document.is_some_and(|p| p.eq_ignore_ascii_case(name)) {
            return false;
        }
    }
    if EXCLUDED_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return false;
    }
    if GRAPHIC_EXTENSIONS.iter().any(|e| lower.ends_with(e))
        || SPREADSHEET_EXTENSIONS.iter().any(|e| lower.ends_with(e))
    {
        return false;
    }

    if primary_document.is_some_and(|p| p.eq_ignore_ascii_case(name)) {
        return true;
    }
    if LINKBASE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        return true;
    }
    if lower.ends_with(".xsd") {
        return true;
    }
    // Remaining .xml files are instance candidates
    lower.ends_with(".xml")
}

/// `metadata.json` written next to each downloaded filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingMetadata {
    /// Accession number
    pub accession_number: String,
    /// Owning company CIK (padded)
    pub cik: String,
    /// Form type
    pub form_type: String,
    /// Filing date (ISO)
    pub filing_date: String,
    /// Primary document name
    pub primary_document: Option<String>,
    /// Primary document description
    pub primary_doc_description: Option<String>,
    /// Classic XBRL attached
    pub is_xbrl: bool,
    /// Inline XBRL
    pub is_inline_xbrl: bool,
    /// Directory listing at download time
    pub documents: Vec<MetadataDocument>,
    /// Download timestamp (ISO, UTC)
    pub download_timestamp: String,
    /// Acceptance timestamp (ISO, UTC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_datetime: Option<String>,
}

/// One directory entry recorded in `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Filename
    pub name: String,
    /// Archive-reported type
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Size in bytes
    pub size: Option<u64>,
    /// Last-modified timestamp
    pub last_modified: Option<String>,
}

/// Outcome of downloading one filing.
#[derive(Debug, Clone)]
pub struct FilingDownloadResult {
    /// Accession number
    pub accession_number: String,
    /// Final status
    pub status: DownloadStatus,
    /// Files written
    pub files_downloaded: Vec<String>,
    /// Total bytes written
    pub bytes_downloaded: u64,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Failure description, when failed
    pub error: Option<String>,
}

/// Outcome of a per-company driver run.
#[derive(Debug, Clone)]
pub struct CompanyDownloadReport {
    /// Company CIK (padded)
    pub cik: String,
    /// Per-filing results for filings attempted this run
    pub results: Vec<FilingDownloadResult>,
    /// Filings skipped because the checkpoint already had them
    pub skipped: usize,
}

/// Downloads filtered filing document sets with checkpointed resume.
#[derive(Debug)]
pub struct Downloader {
    client: ArchiveClient,
    raw_root: PathBuf,
    checkpoint_dir: PathBuf,
}

impl Downloader {
    /// Create a downloader rooted at `raw_root` with checkpoints in
    /// `checkpoint_dir`.
    pub fn new(client: ArchiveClient, raw_root: PathBuf, checkpoint_dir: PathBuf) -> Self {
        Self { client, raw_root, checkpoint_dir }
    }

    /// Local directory for one filing:
    /// `{root}/{year}/{cik_padded}/{accession_no_dashes}/`.
    pub fn filing_dir(&self, cik: &str, filing: &FilingDescriptor) -> PathBuf {
        self.raw_root
            .join(filing.filing_date.year().to_string())
            .join(Company::pad_cik(cik))
            .join(filing.accession_number.replace('-', ""))
    }

    /// Download one filing: directory listing, `metadata.json`, then the
    /// filtered document set. Individual document failures are logged and
    /// the rest continue; verification decides the final status.
    pub async fn download_filing(
        &self,
        cik: &str,
        filing: &FilingDescriptor,
    ) -> Result<FilingDownloadResult> {
        let start = Instant::now();
        let dir = self.filing_dir(cik, filing);
        std::fs::create_dir_all(&dir)?;

        let documents = self
            .client
            .get_filing_documents(cik, &filing.accession_number)
            .await?;

        let metadata = build_metadata(cik, filing, &documents);
        std::fs::write(dir.join("metadata.json"), serde_json::to_string_pretty(&metadata)?)?;

        let mut files_downloaded = Vec::new();
        let mut bytes_downloaded = 0u64;
        let mut last_error = None;

        for doc in documents
            .iter()
            .filter(|d| should_download(&d.name, filing.primary_document.as_deref()))
        {
            match self
                .client
                .fetch_document(cik, &filing.accession_number, &doc.name)
                .await
            {
                Ok(bytes) => {
                    bytes_downloaded += bytes.len() as u64;
                    std::fs::write(dir.join(&doc.name), &bytes)?;
                    files_downloaded.push(doc.name.clone());
                }
                Err(e) => {
                    warn!(accession = %filing.accession_number, document = %doc.name, error = %e, "document fetch failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        let status = if verify_filing(&dir, &metadata) {
            DownloadStatus::Completed
        } else {
            DownloadStatus::Failed
        };

        Ok(FilingDownloadResult {
            accession_number: filing.accession_number.clone(),
            status,
            files_downloaded,
            bytes_downloaded,
            duration_ms: start.elapsed().as_millis() as u64,
            error: if status == DownloadStatus::Failed {
                last_error.or_else(|| Some("verification failed".to_string()))
            } else {
                None
            },
        })
    }

    /// Per-company driver: list filings in the year range, drop the ones the
    /// checkpoint already completed (when `resume`), download the rest, and
    /// persist the checkpoint after every filing.
    pub async fn download_company_filings(
        &self,
        cik: &str,
        form_type: &str,
        start_year: i32,
        end_year: i32,
        resume: bool,
    ) -> Result<CompanyDownloadReport> {
        let start_date = NaiveDate::from_ymd_opt(start_year, 1, 1);
        let end_date = NaiveDate::from_ymd_opt(end_year, 12, 31);
        let filings = self
            .client
            .get_company_filings(cik, form_type, start_date, end_date)
            .await?;

        let mut checkpoint = if resume {
            DownloadCheckpoint::load(&self.checkpoint_dir, cik)?
                .unwrap_or_else(|| DownloadCheckpoint::new(cik))
        } else {
            DownloadCheckpoint::new(cik)
        };

        let (pending, skipped) = pending_filings(filings, &checkpoint);
        info!(cik, pending = pending.len(), skipped, "starting company download");

        let mut results = Vec::new();
        for filing in &pending {
            match self.download_filing(cik, filing).await {
                Ok(result) => {
                    match result.status {
                        DownloadStatus::Completed => checkpoint.mark_completed(&result.accession_number),
                        _ => checkpoint.mark_failed(&result.accession_number),
                    }
                    results.push(result);
                }
                Err(e) => {
                    warn!(accession = %filing.accession_number, error = %e, "filing download failed");
                    checkpoint.mark_failed(&filing.accession_number);
                    results.push(FilingDownloadResult {
                        accession_number: filing.accession_number.clone(),
                        status: DownloadStatus::Failed,
                        files_downloaded: Vec::new(),
                        bytes_downloaded: 0,
                        duration_ms: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
            // Crash consistency: flush after every filing
            checkpoint.save(&self.checkpoint_dir)?;
        }

        Ok(CompanyDownloadReport {
            cik: Company::pad_cik(cik),
            results,
            skipped,
        })
    }

    /// Daily-poll supplement: filings of `form_type` filed strictly after
    /// `since`, newest first. The caller feeds them into the same per-filing
    /// download path.
    pub async fn poll_recent_filings(
        &self,
        cik: &str,
        form_type: &str,
        since: NaiveDate,
    ) -> Result<Vec<FilingDescriptor>> {
        let filings = self
            .client
            .get_company_filings(cik, form_type, None, None)
            .await?;
        Ok(filings.into_iter().filter(|f| f.filing_date > since).collect())
    }
}

/// Split the fetched list into (to download, skipped-count) against the
/// checkpoint.
pub fn pending_filings(
    filings: Vec<FilingDescriptor>,
    checkpoint: &DownloadCheckpoint,
) -> (Vec<FilingDescriptor>, usize) {
    let total = filings.len();
    let pending: Vec<_> = filings
        .into_iter()
        .filter(|f| !checkpoint.is_completed(&f.accession_number))
        .collect();
    let skipped = total - pending.len();
    (pending, skipped)
}

fn build_metadata(cik: &str, filing: &FilingDescriptor, documents: &[DocumentEntry]) -> FilingMetadata {
    FilingMetadata {
        accession_number: filing.accession_number.clone(),
        cik: Company::pad_cik(cik),
        form_type: filing.form_type.clone(),
        filing_date: filing.filing_date.format("%Y-%m-%d").to_string(),
        primary_document: filing.primary_document.clone(),
        primary_doc_description: filing.primary_doc_description.clone(),
        is_xbrl: filing.is_xbrl,
        is_inline_xbrl: filing.is_inline_xbrl,
        documents: documents
            .iter()
            .map(|d| MetadataDocument {
                name: d.name.clone(),
                doc_type: d.doc_type.clone(),
                size: d.size_bytes(),
                last_modified: if d.last_modified.is_empty() {
                    None
                } else {
                    Some(d.last_modified.clone())
                },
            })
            .collect(),
        download_timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        acceptance_datetime: filing
            .acceptance_datetime
            .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    }
}

/// A filing is complete iff `metadata.json` exists, at least one HTML file
/// exists, and (when the metadata says XBRL) at least one XML file exists.
pub fn verify_filing(dir: &Path, metadata: &FilingMetadata) -> bool {
    if !dir.join("metadata.json").exists() {
        return false;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_lowercase())
        .collect();

    let has_html = names.iter().any(|n| n.ends_with(".htm") || n.ends_with(".html"));
    if !has_html {
        return false;
    }
    if metadata.is_xbrl && !names.iter().any(|n| n.ends_with(".xml")) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("aapl-20240928.htm", true)] // primary document
    #[case("aapl-20240928_cal.xml", true)]
    #[case("aapl-20240928_def.xml", true)]
    #[case("aapl-20240928_lab.xml", true)]
    #[case("aapl-20240928_pre.xml", true)]
    #[case("aapl-20240928.xsd", true)]
    #[case("aapl-20240928.xml", true)] // instance candidate
    #[case("R1.htm", false)]
    #[case("r42.htm", false)]
    #[case("ex-101.htm", false)]
    #[case("exhibit21.htm", false)]
    #[case("FilingSummary.xml", false)]
    #[case("Financial_Report.xlsx", false)]
    #[case("image001.jpg", false)]
    #[case("logo.png", false)]
    #[case("report.xls", false)]
    #[case("other-doc.htm", false)] // non-primary html
    fn test_should_download(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(should_download(name, Some("aapl-20240928.htm")), expected, "{name}");
    }

    #[test]
    fn test_primary_document_case_insensitive() {
        assert!(should_download("AAPL-20240928.HTM", Some("aapl-20240928.htm")));
    }

    #[test]
    fn test_defref_excluded_even_as_xml() {
        assert!(!should_download("aapl-20240928_defref.xml", Some("x.htm")));
    }

    #[test]
    fn test_pending_filings_respects_checkpoint() {
        let filings = vec![descriptor("f1"), descriptor("f2"), descriptor("f3")];
        let mut checkpoint = DownloadCheckpoint::new("320193");
        checkpoint.mark_completed("f1");
        checkpoint.mark_completed("f2");

        let (pending, skipped) = pending_filings(filings, &checkpoint);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].accession_number, "f3");
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_failed_filings_are_retried() {
        let filings = vec![descriptor("f1")];
        let mut checkpoint = DownloadCheckpoint::new("320193");
        checkpoint.mark_failed("f1");

        let (pending, skipped) = pending_filings(filings, &checkpoint);
        assert_eq!(pending.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_verify_filing() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = sample_metadata(true);

        // Nothing on disk yet
        assert!(!verify_filing(dir.path(), &metadata));

        std::fs::write(dir.path().join("metadata.json"), "{}").unwrap();
        assert!(!verify_filing(dir.path(), &metadata)); // no html

        std::fs::write(dir.path().join("aapl-20240928.htm"), "<html/>").unwrap();
        assert!(!verify_filing(dir.path(), &metadata)); // xbrl promised, no xml

        std::fs::write(dir.path().join("aapl-20240928.xml"), "<xbrl/>").unwrap();
        assert!(verify_filing(dir.path(), &metadata));
    }

    #[test]
    fn test_verify_filing_without_xbrl() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = sample_metadata(false);
        std::fs::write(dir.path().join("metadata.json"), "{}").unwrap();
        std::fs::write(dir.path().join("doc.htm"), "<html/>").unwrap();
        assert!(verify_filing(dir.path(), &metadata));
    }

    fn descriptor(accession: &str) -> FilingDescriptor {
        FilingDescriptor {
            accession_number: accession.to_string(),
            form_type: "10-K".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            report_date: None,
            acceptance_datetime: None,
            primary_document: Some("doc.htm".to_string()),
            primary_doc_description: None,
            is_xbrl: true,
            is_inline_xbrl: true,
        }
    }

    fn sample_metadata(is_xbrl: bool) -> FilingMetadata {
        FilingMetadata {
            accession_number: "0000320193-24-000123".to_string(),
            cik: "0000320193".to_string(),
            form_type: "10-K".to_string(),
            filing_date: "2024-11-01".to_string(),
            primary_document: Some("aapl-20240928.htm".to_string()),
            primary_doc_description: None,
            is_xbrl,
            is_inline_xbrl: is_xbrl,
            documents: Vec::new(),
            download_timestamp: "2024-11-02T00:00:00Z".to_string(),
            acceptance_datetime: None,
        }
    }
}
