//! Filing repository.

use crate::connection::Store;
use chrono::{DateTime, NaiveDate, Utc};
use finloom::error::Result;
use finloom::types::{DownloadStatus, Filing};
use rusqlite::{OptionalExtension, params};
use std::path::PathBuf;

/// Partial update applied by [`FilingRepository::update_status`].
#[derive(Debug, Default, Clone)]
pub struct FilingStatusUpdate {
    /// New download status
    pub download_status: Option<DownloadStatus>,
    /// New local path
    pub local_path: Option<PathBuf>,
    /// XBRL processing flag
    pub xbrl_processed: Option<bool>,
    /// Section processing flag
    pub sections_processed: Option<bool>,
    /// Extracted full markdown
    pub full_markdown: Option<String>,
}

/// Which processing flag to filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingKind {
    /// `xbrl_processed = 0`
    Xbrl,
    /// `sections_processed = 0`
    Sections,
}

/// Grouped filing operations.
#[derive(Debug)]
pub struct FilingRepository<'a> {
    store: &'a Store,
}

impl<'a> FilingRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or replace a filing's download-facing fields. Processing
    /// flags and extracted markdown survive re-discovery.
    pub fn upsert(&self, filing: &Filing) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO filings (
                accession_number, cik, form_type, filing_date, period_of_report,
                acceptance_datetime, primary_document, primary_doc_description,
                is_xbrl, is_inline_xbrl, local_path, download_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(accession_number) DO UPDATE SET
                form_type = excluded.form_type,
                filing_date = excluded.filing_date,
                period_of_report = COALESCE(excluded.period_of_report, filings.period_of_report),
                acceptance_datetime = COALESCE(excluded.acceptance_datetime, filings.acceptance_datetime),
                primary_document = COALESCE(excluded.primary_document, filings.primary_document),
                primary_doc_description = COALESCE(excluded.primary_doc_description, filings.primary_doc_description),
                is_xbrl = excluded.is_xbrl,
                is_inline_xbrl = excluded.is_inline_xbrl,
                local_path = COALESCE(excluded.local_path, filings.local_path),
                download_status = excluded.download_status",
            params![
                filing.accession_number,
                filing.cik,
                filing.form_type,
                filing.filing_date.format("%Y-%m-%d").to_string(),
                filing.period_of_report.map(|d| d.format("%Y-%m-%d").to_string()),
                filing.acceptance_datetime.map(|t| t.to_rfc3339()),
                filing.primary_document,
                filing.primary_doc_description,
                filing.is_xbrl,
                filing.is_inline_xbrl,
                filing.local_path.as_ref().map(|p| p.display().to_string()),
                filing.download_status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one filing.
    pub fn get(&self, accession: &str) -> Result<Option<Filing>> {
        let filing = self
            .store
            .conn()
            .query_row(
                &format!("{SELECT_FILING} WHERE accession_number = ?1"),
                params![accession],
                row_to_filing,
            )
            .optional()?;
        Ok(filing)
    }

    /// A company's filings, optionally narrowed by form and date range,
    /// newest first.
    pub fn by_company(
        &self,
        cik: &str,
        form_type: Option<&str>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Filing>> {
        let mut sql = format!("{SELECT_FILING} WHERE cik = ?1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(cik.to_string())];

        if let Some(form) = form_type {
            params_vec.push(Box::new(form.to_string()));
            sql.push_str(&format!(" AND form_type = ?{}", params_vec.len()));
        }
        if let Some(from) = from {
            params_vec.push(Box::new(from.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND filing_date >= ?{}", params_vec.len()));
        }
        if let Some(to) = to {
            params_vec.push(Box::new(to.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND filing_date <= ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY filing_date DESC");

        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            row_to_filing,
        )?;
        let mut filings = Vec::new();
        for row in rows {
            filings.push(row?);
        }
        Ok(filings)
    }

    /// Apply a partial status update.
    pub fn update_status(&self, accession: &str, update: &FilingStatusUpdate) -> Result<()> {
        let mut sets: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = update.download_status {
            params_vec.push(Box::new(status.as_str().to_string()));
            sets.push(format!("download_status = ?{}", params_vec.len()));
        }
        if let Some(path) = &update.local_path {
            params_vec.push(Box::new(path.display().to_string()));
            sets.push(format!("local_path = ?{}", params_vec.len()));
        }
        if let Some(flag) = update.xbrl_processed {
            params_vec.push(Box::new(flag));
            sets.push(format!("xbrl_processed = ?{}", params_vec.len()));
        }
        if let Some(flag) = update.sections_processed {
            params_vec.push(Box::new(flag));
            sets.push(format!("sections_processed = ?{}", params_vec.len()));
        }
        if let Some(markdown) = &update.full_markdown {
            params_vec.push(Box::new(markdown.clone()));
            sets.push(format!("full_markdown = ?{}", params_vec.len()));
        }
        if sets.is_empty() {
            return Ok(());
        }

        params_vec.push(Box::new(accession.to_string()));
        let sql = format!(
            "UPDATE filings SET {} WHERE accession_number = ?{}",
            sets.join(", "),
            params_vec.len()
        );
        self.store.conn().execute(
            &sql,
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
        )?;
        Ok(())
    }

    /// Completed filings not yet processed by the given stage.
    pub fn unprocessed(&self, kind: ProcessingKind) -> Result<Vec<Filing>> {
        let flag = match kind {
            ProcessingKind::Xbrl => "xbrl_processed",
            ProcessingKind::Sections => "sections_processed",
        };
        let sql = format!(
            "{SELECT_FILING} WHERE download_status = 'completed' AND {flag} = 0 ORDER BY filing_date"
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_filing)?;
        let mut filings = Vec::new();
        for row in rows {
            filings.push(row?);
        }
        Ok(filings)
    }
}

const SELECT_FILING: &str = "SELECT accession_number, cik, form_type, filing_date,
    period_of_report, acceptance_datetime, primary_document, primary_doc_description,
    is_xbrl, is_inline_xbrl, local_path, download_status, xbrl_processed,
    sections_processed, full_markdown FROM filings";

fn row_to_filing(row: &rusqlite::Row<'_>) -> rusqlite::Result<Filing> {
    let filing_date: String = row.get(3)?;
    let period: Option<String> = row.get(4)?;
    let acceptance: Option<String> = row.get(5)?;
    let local_path: Option<String> = row.get(10)?;
    let status: String = row.get(11)?;

    Ok(Filing {
        accession_number: row.get(0)?,
        cik: row.get(1)?,
        form_type: row.get(2)?,
        filing_date: NaiveDate::parse_from_str(&filing_date, "%Y-%m-%d").unwrap_or_default(),
        period_of_report: period.and_then(|p| NaiveDate::parse_from_str(&p, "%Y-%m-%d").ok()),
        acceptance_datetime: acceptance
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc)),
        primary_document: row.get(6)?,
        primary_doc_description: row.get(7)?,
        is_xbrl: row.get(8)?,
        is_inline_xbrl: row.get(9)?,
        local_path: local_path.map(PathBuf::from),
        download_status: DownloadStatus::parse(&status).unwrap_or(DownloadStatus::Pending),
        xbrl_processed: row.get(12)?,
        sections_processed: row.get(13)?,
        full_markdown: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) fn sample_filing(accession: &str, cik: &str, form: &str, date: &str) -> Filing {
    Filing {
        accession_number: accession.to_string(),
        cik: cik.to_string(),
        form_type: form.to_string(),
        filing_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        period_of_report: None,
        acceptance_datetime: None,
        primary_document: Some("doc.htm".to_string()),
        primary_doc_description: None,
        is_xbrl: true,
        is_inline_xbrl: true,
        local_path: None,
        download_status: DownloadStatus::Pending,
        xbrl_processed: false,
        sections_processed: false,
        full_markdown: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finloom::types::Company;

    fn seed_company(store: &Store, cik: &str, ticker: &str) {
        store
            .companies()
            .upsert(&Company {
                cik: cik.to_string(),
                name: format!("{ticker} Inc."),
                ticker: Some(ticker.to_string()),
                sic_code: None,
                sic_description: None,
                state_of_incorporation: None,
                fiscal_year_end: None,
                ein: None,
            })
            .unwrap();
    }

    #[test]
    fn test_upsert_get_roundtrip() {
        let store = Store::in_memory().unwrap();
        seed_company(&store, "0000320193", "AAPL");
        let filing = sample_filing("acc-1", "0000320193", "10-K", "2024-11-01");
        store.filings().upsert(&filing).unwrap();

        let loaded = store.filings().get("acc-1").unwrap().unwrap();
        assert_eq!(loaded.form_type, "10-K");
        assert_eq!(loaded.download_status, DownloadStatus::Pending);
        assert!(loaded.is_xbrl);
    }

    #[test]
    fn test_update_status_partial() {
        let store = Store::in_memory().unwrap();
        seed_company(&store, "0000320193", "AAPL");
        store
            .filings()
            .upsert(&sample_filing("acc-1", "0000320193", "10-K", "2024-11-01"))
            .unwrap();

        store
            .filings()
            .update_status(
                "acc-1",
                &FilingStatusUpdate {
                    download_status: Some(DownloadStatus::Completed),
                    xbrl_processed: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        let loaded = store.filings().get("acc-1").unwrap().unwrap();
        assert_eq!(loaded.download_status, DownloadStatus::Completed);
        assert!(loaded.xbrl_processed);
        assert!(!loaded.sections_processed);
    }

    #[test]
    fn test_by_company_filters_and_orders() {
        let store = Store::in_memory().unwrap();
        seed_company(&store, "0000320193", "AAPL");
        for (acc, form, date) in [
            ("acc-1", "10-K", "2022-10-28"),
            ("acc-2", "10-K", "2024-11-01"),
            ("acc-3", "8-K", "2024-08-01"),
            ("acc-4", "10-K", "2023-11-03"),
        ] {
            store
                .filings()
                .upsert(&sample_filing(acc, "0000320193", form, date))
                .unwrap();
        }

        let tenks = store
            .filings()
            .by_company("0000320193", Some("10-K"), None, None)
            .unwrap();
        let accessions: Vec<&str> = tenks.iter().map(|f| f.accession_number.as_str()).collect();
        assert_eq!(accessions, vec!["acc-2", "acc-4", "acc-1"]);

        let ranged = store
            .filings()
            .by_company(
                "0000320193",
                Some("10-K"),
                NaiveDate::from_ymd_opt(2023, 1, 1),
                None,
            )
            .unwrap();
        assert_eq!(ranged.len(), 2);
    }

    #[test]
    fn test_unprocessed() {
        let store = Store::in_memory().unwrap();
        seed_company(&store, "0000320193", "AAPL");
        store
            .filings()
            .upsert(&sample_filing("acc-1", "0000320193", "10-K", "2024-11-01"))
            .unwrap();

        // Pending filings are not eligible for processing
        assert!(store.filings().unprocessed(ProcessingKind::Xbrl).unwrap().is_empty());

        store
            .filings()
            .update_status(
                "acc-1",
                &FilingStatusUpdate {
                    download_status: Some(DownloadStatus::Completed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.filings().unprocessed(ProcessingKind::Xbrl).unwrap().len(), 1);

        store
            .filings()
            .update_status(
                "acc-1",
                &FilingStatusUpdate { xbrl_processed: Some(true), ..Default::default() },
            )
            .unwrap();
        assert!(store.filings().unprocessed(ProcessingKind::Xbrl).unwrap().is_empty());
        assert_eq!(
            store.filings().unprocessed(ProcessingKind::Sections).unwrap().len(),
            1
        );
    }
}
