//! Normalization repository: canonical metrics, concept mappings,
//! latest-filing selection and the confidence-ruled normalized table.

use crate::connection::Store;
use chrono::NaiveDate;
use finloom::error::{FinloomError, Result};
use finloom::types::{ConceptMapping, NormalizedFinancial, StandardizedMetric};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

/// One winner of latest-filing-per-fiscal-year selection.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestFiling {
    /// Accession number
    pub accession_number: String,
    /// Company CIK
    pub cik: String,
    /// Company ticker
    pub ticker: String,
    /// Form type that won (amendments beat originals)
    pub form_type: String,
    /// Filing date
    pub filing_date: NaiveDate,
    /// Fiscal year the filing reports on
    pub fiscal_year: i32,
}

/// Outcome of a confidence-ruled upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row inserted
    Inserted(i64),
    /// Existing row replaced (new confidence >= old)
    Updated(i64),
    /// Existing row kept (new confidence < old)
    Skipped(i64),
}

/// One member of a duplicate group.
#[derive(Debug, Clone)]
pub struct DuplicateRow {
    /// Row id
    pub id: i64,
    /// Confidence score
    pub confidence: f64,
    /// Creation timestamp (lexically comparable)
    pub created_at: String,
}

/// A set of rows sharing `(ticker, fiscal_year, fiscal_quarter, metric_id)`.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// Company ticker
    pub ticker: String,
    /// Fiscal year
    pub fiscal_year: i32,
    /// Fiscal quarter
    pub fiscal_quarter: Option<i32>,
    /// Metric id
    pub metric_id: String,
    /// All rows in the group
    pub rows: Vec<DuplicateRow>,
    /// Row kept by cleanup: highest confidence, then most recent
    pub keeper_id: i64,
}

/// Outcome of duplicate cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    /// Groups with more than one row
    pub duplicate_groups: usize,
    /// Rows deleted (or that would be, in dry-run)
    pub records_removed: usize,
    /// Rows kept
    pub records_kept: usize,
}

/// Grouped normalization operations.
#[derive(Debug)]
pub struct NormalizationRepository<'a> {
    store: &'a Store,
}

impl<'a> NormalizationRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or update a canonical metric definition.
    pub fn upsert_standardized_metric(&self, metric: &StandardizedMetric) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO standardized_metrics (metric_id, label, category, data_type, description, calculation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(metric_id) DO UPDATE SET
                label = excluded.label,
                category = excluded.category,
                data_type = excluded.data_type,
                description = COALESCE(excluded.description, standardized_metrics.description),
                calculation = COALESCE(excluded.calculation, standardized_metrics.calculation)",
            params![
                metric.metric_id,
                metric.label,
                metric.category,
                metric.data_type,
                metric.description,
                metric.calculation,
            ],
        )?;
        Ok(())
    }

    /// Insert or update a concept mapping (unique on metric + concept).
    pub fn upsert_concept_mapping(&self, mapping: &ConceptMapping) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO concept_mappings (metric_id, concept_name, priority, confidence, industry_filter)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(metric_id, concept_name) DO UPDATE SET
                priority = excluded.priority,
                confidence = excluded.confidence,
                industry_filter = excluded.industry_filter",
            params![
                mapping.metric_id,
                mapping.concept_name,
                mapping.priority,
                mapping.confidence,
                mapping.industry_filter,
            ],
        )?;
        Ok(())
    }

    /// All mappings, optionally for one metric, ascending priority.
    pub fn concept_mappings(&self, metric_id: Option<&str>) -> Result<Vec<ConceptMapping>> {
        let mut sql = String::from(
            "SELECT metric_id, concept_name, priority, confidence, industry_filter
             FROM concept_mappings",
        );
        if metric_id.is_some() {
            sql.push_str(" WHERE metric_id = ?1");
        }
        sql.push_str(" ORDER BY metric_id, priority");

        let mut stmt = self.store.conn().prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<ConceptMapping> {
            Ok(ConceptMapping {
                metric_id: row.get(0)?,
                concept_name: row.get(1)?,
                priority: row.get(2)?,
                confidence: row.get(3)?,
                industry_filter: row.get(4)?,
            })
        };
        let mut mappings = Vec::new();
        match metric_id {
            Some(id) => {
                for row in stmt.query_map(params![id], map_row)? {
                    mappings.push(row?);
                }
            }
            None => {
                for row in stmt.query_map([], map_row)? {
                    mappings.push(row?);
                }
            }
        }
        Ok(mappings)
    }

    /// Select exactly one source filing per `(company, fiscal_year)`.
    ///
    /// Fiscal year comes from the filing's period of report when present,
    /// else from the newest fact period end. Amendments sort before
    /// originals; within the same form class the most recent filing date
    /// wins.
    pub fn latest_filing_per_fiscal_year(
        &self,
        form_types: &[&str],
        ticker: Option<&str>,
    ) -> Result<Vec<LatestFiling>> {
        if form_types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=form_types.len()).map(|i| format!("?{i}")).collect();
        let mut sql = format!(
            "WITH filing_years AS (
                SELECT
                    f.accession_number,
                    f.cik,
                    f.form_type,
                    f.filing_date,
                    COALESCE(
                        CAST(strftime('%Y', f.period_of_report) AS INTEGER),
                        MAX(CAST(strftime('%Y', fa.period_end) AS INTEGER))
                    ) AS fiscal_year
                FROM filings f
                LEFT JOIN facts fa ON f.accession_number = fa.accession_number
                WHERE f.xbrl_processed = 1
                  AND f.form_type IN ({})
                GROUP BY f.accession_number, f.cik, f.form_type, f.filing_date, f.period_of_report
            ),
            ranked_filings AS (
                SELECT
                    fy.accession_number,
                    fy.cik,
                    c.ticker,
                    fy.form_type,
                    fy.filing_date,
                    fy.fiscal_year,
                    ROW_NUMBER() OVER (
                        PARTITION BY fy.cik, fy.fiscal_year
                        ORDER BY
                            CASE WHEN fy.form_type LIKE '%/A' THEN 1 ELSE 2 END ASC,
                            fy.filing_date DESC
                    ) AS priority_rank
                FROM filing_years fy
                JOIN companies c ON fy.cik = c.cik
                WHERE fy.fiscal_year IS NOT NULL",
            placeholders.join(", ")
        );

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = form_types
            .iter()
            .map(|f| Box::new(f.to_string()) as Box<dyn rusqlite::ToSql>)
            .collect();
        if let Some(ticker) = ticker {
            params_vec.push(Box::new(ticker.to_string()));
            sql.push_str(&format!(" AND c.ticker = ?{}", params_vec.len()));
        }
        sql.push_str(
            ")
            SELECT accession_number, cik, ticker, form_type, filing_date, fiscal_year
            FROM ranked_filings
            WHERE priority_rank = 1
            ORDER BY fiscal_year DESC",
        );

        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok(LatestFiling {
                    accession_number: row.get(0)?,
                    cik: row.get(1)?,
                    ticker: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    form_type: row.get(3)?,
                    filing_date: NaiveDate::parse_from_str(&row.get::<_, String>(4)?, "%Y-%m-%d")
                        .unwrap_or_default(),
                    fiscal_year: row.get(5)?,
                })
            },
        )?;
        let mut filings = Vec::new();
        for row in rows {
            filings.push(row?);
        }
        Ok(filings)
    }

    /// Confidence-ruled upsert: strictly higher wins, equal replaces
    /// (newer value preferred), strictly lower is rejected.
    pub fn upsert_normalized(&self, row: &NormalizedFinancial) -> Result<UpsertOutcome> {
        let conn = self.store.conn();
        let existing: Option<(i64, f64)> = conn
            .query_row(
                "SELECT id, confidence_score FROM normalized_financials
                 WHERE company_ticker = ?1
                   AND fiscal_year = ?2
                   AND COALESCE(fiscal_quarter, -1) = COALESCE(?3, -1)
                   AND metric_id = ?4",
                params![row.company_ticker, row.fiscal_year, row.fiscal_quarter, row.metric_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, existing_confidence)) => {
                if row.confidence >= existing_confidence {
                    conn.execute(
                        "UPDATE normalized_financials
                         SET metric_value = ?1,
                             source_concept = ?2,
                             source_accession = ?3,
                             confidence_score = ?4,
                             created_at = CURRENT_TIMESTAMP
                         WHERE id = ?5",
                        params![row.value, row.source_concept, row.source_accession, row.confidence, id],
                    )?;
                    debug!(metric = %row.metric_id, ticker = %row.company_ticker, fy = row.fiscal_year, "normalized metric updated");
                    Ok(UpsertOutcome::Updated(id))
                } else {
                    debug!(metric = %row.metric_id, ticker = %row.company_ticker, fy = row.fiscal_year, "normalized metric kept (lower confidence offered)");
                    Ok(UpsertOutcome::Skipped(id))
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO normalized_financials (
                        company_ticker, fiscal_year, fiscal_quarter, metric_id,
                        metric_value, source_concept, source_accession, confidence_score
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.company_ticker,
                        row.fiscal_year,
                        row.fiscal_quarter,
                        row.metric_id,
                        row.value,
                        row.source_concept,
                        row.source_accession,
                        row.confidence,
                    ],
                )?;
                Ok(UpsertOutcome::Inserted(conn.last_insert_rowid()))
            }
        }
    }

    /// Normalized rows, optionally narrowed by ticker and metric.
    pub fn normalized(
        &self,
        ticker: Option<&str>,
        metric_id: Option<&str>,
    ) -> Result<Vec<NormalizedFinancial>> {
        let mut sql = String::from(
            "SELECT company_ticker, fiscal_year, fiscal_quarter, metric_id,
                    metric_value, source_concept, source_accession, confidence_score
             FROM normalized_financials WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ticker) = ticker {
            params_vec.push(Box::new(ticker.to_string()));
            sql.push_str(&format!(" AND company_ticker = ?{}", params_vec.len()));
        }
        if let Some(metric) = metric_id {
            params_vec.push(Box::new(metric.to_string()));
            sql.push_str(&format!(" AND metric_id = ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY company_ticker, fiscal_year DESC, metric_id");

        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok(NormalizedFinancial {
                    company_ticker: row.get(0)?,
                    fiscal_year: row.get(1)?,
                    fiscal_quarter: row.get(2)?,
                    metric_id: row.get(3)?,
                    value: row.get(4)?,
                    source_concept: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    source_accession: row.get(6)?,
                    confidence: row.get(7)?,
                })
            },
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Detect duplicate groups in `normalized_financials`, marking each
    /// group's keeper (highest confidence, most recent `created_at`).
    pub fn detect_duplicates(&self, table: &str) -> Result<Vec<DuplicateGroup>> {
        if table != "normalized_financials" {
            return Err(FinloomError::Validation(format!(
                "duplicate detection not implemented for table: {table}"
            )));
        }

        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT company_ticker, fiscal_year, fiscal_quarter, metric_id, COUNT(*) AS count
             FROM normalized_financials
             GROUP BY company_ticker, fiscal_year, COALESCE(fiscal_quarter, -1), metric_id
             HAVING COUNT(*) > 1
             ORDER BY count DESC, company_ticker, fiscal_year DESC",
        )?;
        let keys = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, Option<i32>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut groups = Vec::new();
        for key in keys {
            let (ticker, fiscal_year, fiscal_quarter, metric_id) = key?;
            let mut row_stmt = conn.prepare(
                "SELECT id, confidence_score, created_at FROM normalized_financials
                 WHERE company_ticker = ?1 AND fiscal_year = ?2
                   AND COALESCE(fiscal_quarter, -1) = COALESCE(?3, -1)
                   AND metric_id = ?4
                 ORDER BY confidence_score DESC, created_at DESC, id DESC",
            )?;
            let rows = row_stmt.query_map(
                params![ticker, fiscal_year, fiscal_quarter, metric_id],
                |row| {
                    Ok(DuplicateRow {
                        id: row.get(0)?,
                        confidence: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )?;
            let mut members = Vec::new();
            for row in rows {
                members.push(row?);
            }
            let keeper_id = members.first().map(|r| r.id).unwrap_or_default();
            groups.push(DuplicateGroup {
                ticker,
                fiscal_year,
                fiscal_quarter,
                metric_id,
                rows: members,
                keeper_id,
            });
        }
        Ok(groups)
    }

    /// Delete every non-keeper inside one transaction. Dry-run reports the
    /// same statistics without touching the store.
    pub fn remove_duplicates(&self, table: &str, dry_run: bool) -> Result<DedupStats> {
        let groups = self.detect_duplicates(table)?;
        if groups.is_empty() {
            return Ok(DedupStats { duplicate_groups: 0, records_removed: 0, records_kept: 0 });
        }

        let to_remove: Vec<i64> = groups
            .iter()
            .flat_map(|g| g.rows.iter().filter(|r| r.id != g.keeper_id).map(|r| r.id))
            .collect();
        let stats = DedupStats {
            duplicate_groups: groups.len(),
            records_removed: to_remove.len(),
            records_kept: groups.len(),
        };

        if dry_run {
            info!(groups = stats.duplicate_groups, would_remove = stats.records_removed, "dry-run duplicate cleanup");
            return Ok(stats);
        }

        let tx = self.store.conn().unchecked_transaction()?;
        let result: Result<()> = (|| {
            for id in &to_remove {
                tx.execute("DELETE FROM normalized_financials WHERE id = ?1", params![id])?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                tx.commit()?;
                info!(groups = stats.duplicate_groups, removed = stats.records_removed, "duplicates removed");
                Ok(stats)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}
