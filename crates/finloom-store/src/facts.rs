//! Fact repository with deduplicating inserts.

use crate::connection::Store;
use chrono::NaiveDate;
use finloom::error::{FinloomError, Result};
use finloom::types::{Fact, FactValue, PeriodType};
use polars::prelude::*;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;

/// Grouped fact operations.
#[derive(Debug)]
pub struct FactRepository<'a> {
    store: &'a Store,
}

impl<'a> FactRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert one fact, deduplicating on
    /// `(accession, concept, period_end, dimensions)`.
    ///
    /// Returns the existing row id when the tuple is already present; the
    /// check-then-insert pair runs inside one transaction so parallel
    /// parsers serialize here.
    pub fn insert(&self, fact: &Fact) -> Result<i64> {
        let conn = self.store.conn();
        let tx = conn.unchecked_transaction()?;

        let dimensions_json = fact.dimensions_json();
        let period_end = fact.period_end.map(|d| d.format("%Y-%m-%d").to_string());

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM facts
                 WHERE accession_number = ?1
                   AND concept_name = ?2
                   AND period_end IS ?3
                   AND dimensions IS ?4",
                params![fact.accession_number, fact.concept_qname, period_end, dimensions_json],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            tx.commit()?;
            return Ok(id);
        }

        let (value, value_text) = match &fact.value {
            FactValue::Numeric(v) => (Some(*v), None),
            FactValue::Text(t) => (None, Some(t.clone())),
            FactValue::Missing => (None, None),
        };

        tx.execute(
            "INSERT INTO facts (
                accession_number, concept_namespace, concept_local_name, concept_name,
                value, value_text, unit, decimals, period_type, period_start, period_end,
                dimensions, is_custom, section, parent_concept, depth, label
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                fact.accession_number,
                fact.concept_namespace,
                fact.concept_local,
                fact.concept_qname,
                value,
                value_text,
                fact.unit,
                fact.decimals,
                fact.period_type.as_str(),
                fact.period_start.map(|d| d.format("%Y-%m-%d").to_string()),
                period_end,
                dimensions_json,
                fact.is_custom,
                fact.section,
                fact.parent_concept,
                fact.depth,
                fact.label,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Insert many facts; returns how many rows were newly inserted.
    pub fn batch_insert(&self, facts: &[Fact]) -> Result<usize> {
        let before = self.count_all()?;
        for fact in facts {
            self.insert(fact)?;
        }
        let after = self.count_all()?;
        Ok((after - before) as usize)
    }

    fn count_all(&self) -> Result<i64> {
        Ok(self
            .store
            .conn()
            .query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))?)
    }

    /// Facts for one filing, optionally narrowed to a concept.
    pub fn get(&self, accession: &str, concept: Option<&str>) -> Result<Vec<Fact>> {
        let mut sql = String::from(
            "SELECT id, accession_number, concept_namespace, concept_local_name, concept_name,
                    value, value_text, unit, decimals, period_type, period_start, period_end,
                    dimensions, is_custom, section, parent_concept, depth, label
             FROM facts WHERE accession_number = ?1",
        );
        if concept.is_some() {
            sql.push_str(" AND concept_name = ?2");
        }

        let mut stmt = self.store.conn().prepare(&sql)?;
        let mut facts = Vec::new();
        let mut push_rows = |rows: &mut rusqlite::Rows<'_>| -> Result<()> {
            while let Some(row) = rows.next()? {
                facts.push(row_to_fact(row)?);
            }
            Ok(())
        };
        match concept {
            Some(c) => push_rows(&mut stmt.query(params![accession, c])?)?,
            None => push_rows(&mut stmt.query(params![accession])?)?,
        }
        Ok(facts)
    }

    /// History of one concept for one company as an analytical frame
    /// ordered by period end.
    pub fn fact_history(
        &self,
        cik: &str,
        concept: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<DataFrame> {
        let mut sql = String::from(
            "SELECT fa.accession_number, f.form_type, fa.period_end, fa.value, fa.unit
             FROM facts fa
             JOIN filings f ON fa.accession_number = f.accession_number
             WHERE f.cik = ?1 AND fa.concept_name = ?2 AND fa.value IS NOT NULL
               AND fa.dimensions IS NULL",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(cik.to_string()), Box::new(concept.to_string())];
        if let Some(from) = from {
            params_vec.push(Box::new(from.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND fa.period_end >= ?{}", params_vec.len()));
        }
        if let Some(to) = to {
            params_vec.push(Box::new(to.format("%Y-%m-%d").to_string()));
            sql.push_str(&format!(" AND fa.period_end <= ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY fa.period_end");

        let mut stmt = self.store.conn().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params_vec.iter().map(|p| p.as_ref())),
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        let mut accessions = Vec::new();
        let mut forms = Vec::new();
        let mut period_ends = Vec::new();
        let mut values = Vec::new();
        let mut units = Vec::new();
        for row in rows {
            let (accession, form, period_end, value, unit) = row?;
            accessions.push(accession);
            forms.push(form);
            period_ends.push(period_end);
            values.push(value);
            units.push(unit);
        }

        DataFrame::new(vec![
            Series::new("accession_number".into(), accessions).into(),
            Series::new("form_type".into(), forms).into(),
            Series::new("period_end".into(), period_ends).into(),
            Series::new("value".into(), values).into(),
            Series::new("unit".into(), units).into(),
        ])
        .map_err(|e| FinloomError::Frame(e.to_string()))
    }
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> Result<Fact> {
    let value: Option<f64> = row.get(5)?;
    let value_text: Option<String> = row.get(6)?;
    let period_type: String = row.get(9)?;
    let period_start: Option<String> = row.get(10)?;
    let period_end: Option<String> = row.get(11)?;
    let dimensions: Option<String> = row.get(12)?;

    let dimensions: Option<BTreeMap<String, String>> = match dimensions {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };

    Ok(Fact {
        id: Some(row.get(0)?),
        accession_number: row.get(1)?,
        concept_namespace: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        concept_local: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        concept_qname: row.get(4)?,
        value: match (value, value_text) {
            (Some(v), _) => FactValue::Numeric(v),
            (None, Some(t)) => FactValue::Text(t),
            (None, None) => FactValue::Missing,
        },
        unit: row.get(7)?,
        decimals: row.get(8)?,
        period_type: PeriodType::parse(&period_type),
        period_start: period_start.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        period_end: period_end.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        dimensions,
        is_custom: row.get(13)?,
        section: row.get(14)?,
        parent_concept: row.get(15)?,
        depth: row.get(16)?,
        label: row.get(17)?,
    })
}
