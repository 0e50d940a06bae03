//! Processing-log and ad-hoc analytics repository.

use crate::connection::Store;
use finloom::error::{FinloomError, Result};
use polars::prelude::*;
use rusqlite::params;

/// One processing-log entry.
#[derive(Debug, Clone)]
pub struct ProcessingLog<'a> {
    /// Pipeline stage (`download`, `xbrl_parse`, `section_extract`, ...)
    pub stage: &'a str,
    /// Outcome (`success`, `failure`, `skipped`)
    pub status: &'a str,
    /// Filing involved, when applicable
    pub accession_number: Option<&'a str>,
    /// Company involved, when applicable
    pub cik: Option<&'a str>,
    /// Human-readable message
    pub message: Option<&'a str>,
    /// Stage duration
    pub duration_ms: Option<i64>,
    /// Arbitrary structured context
    pub context: Option<serde_json::Value>,
}

/// Grouped analytics operations.
#[derive(Debug)]
pub struct AnalyticsRepository<'a> {
    store: &'a Store,
}

impl<'a> AnalyticsRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Record one pipeline event.
    pub fn log_processing(&self, entry: &ProcessingLog<'_>) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO processing_logs (
                stage, status, accession_number, cik, message, duration_ms, context
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.stage,
                entry.status,
                entry.accession_number,
                entry.cik,
                entry.message,
                entry.duration_ms,
                entry.context.as_ref().map(|c| c.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Per-stage success/failure summary as an analytical frame.
    pub fn stage_summary(&self) -> Result<DataFrame> {
        self.query(
            "SELECT stage, status, COUNT(*) AS count, AVG(duration_ms) AS avg_duration_ms
             FROM processing_logs GROUP BY stage, status ORDER BY stage, status",
        )
    }

    /// Share of XBRL-processed filings that actually have stored facts.
    ///
    /// Healthy corpora stay at or above 0.95; malformed instances account
    /// for the documented tolerance.
    pub fn facts_presence_rate(&self) -> Result<f64> {
        let (with_facts, total): (i64, i64) = self.store.conn().query_row(
            "SELECT
                COUNT(DISTINCT CASE WHEN fa.accession_number IS NOT NULL THEN f.accession_number END),
                COUNT(DISTINCT f.accession_number)
             FROM filings f
             LEFT JOIN facts fa ON f.accession_number = fa.accession_number
             WHERE f.xbrl_processed = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if total == 0 {
            return Ok(1.0);
        }
        Ok(with_facts as f64 / total as f64)
    }

    /// Share of filings reporting assets, liabilities and equity whose
    /// balance-sheet equation holds within `tolerance` (fractional).
    pub fn balance_sheet_consistency(&self, tolerance: f64) -> Result<f64> {
        let mut stmt = self.store.conn().prepare(
            "SELECT a.accession_number, a.value, l.value, e.value
             FROM facts a
             JOIN facts l ON l.accession_number = a.accession_number
                 AND l.concept_name = 'us-gaap:Liabilities'
                 AND l.period_end = a.period_end AND l.dimensions IS NULL
             JOIN facts e ON e.accession_number = a.accession_number
                 AND e.concept_name = 'us-gaap:StockholdersEquity'
                 AND e.period_end = a.period_end AND e.dimensions IS NULL
             WHERE a.concept_name = 'us-gaap:Assets'
               AND a.dimensions IS NULL AND a.value IS NOT NULL
               AND l.value IS NOT NULL AND e.value IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut total = 0usize;
        let mut consistent = 0usize;
        for row in rows {
            let (assets, liabilities, equity) = row?;
            total += 1;
            if assets.abs() > 0.0 && ((liabilities + equity) - assets).abs() / assets.abs() <= tolerance {
                consistent += 1;
            }
        }
        if total == 0 {
            return Ok(1.0);
        }
        Ok(consistent as f64 / total as f64)
    }

    /// Run arbitrary read-only SQL and return the rows as a frame.
    ///
    /// # Errors
    /// Rejects anything that is not a single SELECT statement.
    pub fn query(&self, sql: &str) -> Result<DataFrame> {
        let trimmed = sql.trim_start().to_lowercase();
        if !(trimmed.starts_with("select") || trimmed.starts_with("with")) {
            return Err(FinloomError::Validation(
                "analytics queries must be read-only SELECT statements".to_string(),
            ));
        }

        let mut stmt = self.store.conn().prepare(sql)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let column_count = column_names.len();

        // Collect everything as strings or floats; mixed-type inspection
        // queries do not need tighter dtypes
        let mut text_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); column_count];
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, column) in text_columns.iter_mut().enumerate() {
                let value: Option<String> = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => None,
                    rusqlite::types::ValueRef::Integer(v) => Some(v.to_string()),
                    rusqlite::types::ValueRef::Real(v) => Some(v.to_string()),
                    rusqlite::types::ValueRef::Text(t) => {
                        Some(String::from_utf8_lossy(t).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(_) => Some("<blob>".to_string()),
                };
                column.push(value);
            }
        }

        let series: Vec<Column> = column_names
            .into_iter()
            .zip(text_columns)
            .map(|(name, values)| Series::new(name.into(), values).into())
            .collect();
        DataFrame::new(series).map_err(|e| FinloomError::Frame(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_and_summarize() {
        let store = Store::in_memory().unwrap();
        let analytics = store.analytics();

        analytics
            .log_processing(&ProcessingLog {
                stage: "xbrl_parse",
                status: "success",
                accession_number: Some("acc-1"),
                cik: Some("0000320193"),
                message: None,
                duration_ms: Some(120),
                context: Some(serde_json::json!({"facts": 512})),
            })
            .unwrap();
        analytics
            .log_processing(&ProcessingLog {
                stage: "xbrl_parse",
                status: "failure",
                accession_number: Some("acc-2"),
                cik: None,
                message: Some("No XBRL instance document found"),
                duration_ms: Some(3),
                context: None,
            })
            .unwrap();

        let summary = analytics.stage_summary().unwrap();
        assert_eq!(summary.height(), 2);
    }

    #[test]
    fn test_balance_sheet_consistency() {
        use crate::filings::sample_filing;
        use finloom::types::{Company, Fact, FactValue, PeriodType};

        let store = Store::in_memory().unwrap();
        store
            .companies()
            .upsert(&Company {
                cik: "1".to_string(),
                name: "A".to_string(),
                ticker: Some("A".to_string()),
                sic_code: None,
                sic_description: None,
                state_of_incorporation: None,
                fiscal_year_end: None,
                ein: None,
            })
            .unwrap();
        store.filings().upsert(&sample_filing("acc-1", "1", "10-K", "2024-11-01")).unwrap();

        let fact = |concept: &str, value: f64| Fact {
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
            period_end: chrono::NaiveDate::from_ymd_opt(2024, 9, 28),
            dimensions: None,
            is_custom: false,
            section: None,
            parent_concept: None,
            depth: None,
            label: None,
        };
        store.facts().insert(&fact("us-gaap:Assets", 1000.0)).unwrap();
        store.facts().insert(&fact("us-gaap:Liabilities", 600.0)).unwrap();
        store.facts().insert(&fact("us-gaap:StockholdersEquity", 395.0)).unwrap();

        // 995 vs 1000 is within 1%
        let rate = store.analytics().balance_sheet_consistency(0.01).unwrap();
        assert_eq!(rate, 1.0);
        // ...but not within 0.1%
        let strict = store.analytics().balance_sheet_consistency(0.001).unwrap();
        assert_eq!(strict, 0.0);
    }

    #[test]
    fn test_facts_presence_rate_empty_corpus() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.analytics().facts_presence_rate().unwrap(), 1.0);
    }

    #[test]
    fn test_query_rejects_writes() {
        let store = Store::in_memory().unwrap();
        let result = store.analytics().query("DELETE FROM processing_logs");
        assert!(matches!(result, Err(FinloomError::Validation(_))));
    }

    #[test]
    fn test_query_returns_frame() {
        let store = Store::in_memory().unwrap();
        let frame = store
            .analytics()
            .query("SELECT 1 AS one, 'x' AS label")
            .unwrap();
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.width(), 2);
    }
}
