//! Section repository.

use crate::connection::Store;
use finloom::error::Result;
use finloom::types::{CrossReference, Section};
use rusqlite::{OptionalExtension, params};

/// Grouped section operations.
#[derive(Debug)]
pub struct SectionRepository<'a> {
    store: &'a Store,
}

impl<'a> SectionRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or replace one section of a filing.
    pub fn upsert(&self, section: &Section) -> Result<()> {
        self.store.conn().execute(
            "INSERT OR REPLACE INTO sections (
                accession_number, section_type, section_number, title,
                content_text, content_html, content_markdown,
                word_count, char_count, paragraph_count, extraction_confidence,
                part, table_count, list_count, footnote_count,
                cross_references, heading_hierarchy, extraction_quality, extraction_issues
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                section.accession_number,
                section.section_type,
                section.section_number,
                section.title,
                section.content_text,
                section.content_html,
                section.content_markdown,
                section.word_count,
                section.char_count,
                section.paragraph_count,
                section.extraction_confidence,
                section.part,
                section.table_count,
                section.list_count,
                section.footnote_count,
                serde_json::to_string(&section.cross_references)?,
                serde_json::to_string(&section.heading_hierarchy)?,
                section.extraction_quality,
                serde_json::to_string(&section.extraction_issues)?,
            ],
        )?;
        Ok(())
    }

    /// Fetch one section of a filing.
    pub fn get(&self, accession: &str, section_type: &str) -> Result<Option<Section>> {
        let section = self
            .store
            .conn()
            .query_row(
                &format!("{SELECT_SECTION} WHERE accession_number = ?1 AND section_type = ?2"),
                params![accession, section_type],
                row_to_section,
            )
            .optional()?;
        Ok(section)
    }

    /// All sections of a filing.
    pub fn by_filing(&self, accession: &str) -> Result<Vec<Section>> {
        let mut stmt = self
            .store
            .conn()
            .prepare(&format!("{SELECT_SECTION} WHERE accession_number = ?1 ORDER BY section_type"))?;
        let rows = stmt.query_map(params![accession], row_to_section)?;
        let mut sections = Vec::new();
        for row in rows {
            sections.push(row?);
        }
        Ok(sections)
    }
}

const SELECT_SECTION: &str = "SELECT accession_number, section_type, section_number, title,
    content_text, content_html, content_markdown, word_count, char_count, paragraph_count,
    extraction_confidence, part, table_count, list_count, footnote_count,
    cross_references, heading_hierarchy, extraction_quality, extraction_issues FROM sections";

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
    let cross_refs: Option<String> = row.get(15)?;
    let headings: Option<String> = row.get(16)?;
    let issues: Option<String> = row.get(18)?;

    Ok(Section {
        accession_number: row.get(0)?,
        section_type: row.get(1)?,
        section_number: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        content_text: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        content_html: row.get(5)?,
        content_markdown: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        word_count: row.get::<_, i64>(7)? as usize,
        char_count: row.get::<_, i64>(8)? as usize,
        paragraph_count: row.get::<_, i64>(9)? as usize,
        extraction_confidence: row.get(10)?,
        part: row.get(11)?,
        table_count: row.get::<_, i64>(12)? as usize,
        list_count: row.get::<_, i64>(13)? as usize,
        footnote_count: row.get::<_, i64>(14)? as usize,
        cross_references: cross_refs
            .and_then(|j| serde_json::from_str::<Vec<CrossReference>>(&j).ok())
            .unwrap_or_default(),
        heading_hierarchy: headings
            .and_then(|j| serde_json::from_str::<Vec<String>>(&j).ok())
            .unwrap_or_default(),
        extraction_quality: row.get(17)?,
        extraction_issues: issues
            .and_then(|j| serde_json::from_str::<Vec<String>>(&j).ok())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filings::sample_filing;
    use finloom::types::Company;

    fn sample_section() -> Section {
        Section {
            accession_number: "acc-1".to_string(),
            section_type: "item_1a".to_string(),
            section_number: "1A".to_string(),
            title: "Risk Factors".to_string(),
            content_text: "Risks described here.".to_string(),
            content_html: None,
            content_markdown: "## Risk Factors".to_string(),
            word_count: 3,
            char_count: 21,
            paragraph_count: 1,
            extraction_confidence: 0.95,
            part: Some("Part I".to_string()),
            table_count: 0,
            list_count: 0,
            footnote_count: 0,
            cross_references: vec![CrossReference {
                target: "Item 7".to_string(),
                text: "See Item 7".to_string(),
            }],
            heading_hierarchy: vec!["OVERVIEW".to_string()],
            extraction_quality: 0.9,
            extraction_issues: vec![],
        }
    }

    #[test]
    fn test_upsert_roundtrip() {
        let store = Store::in_memory().unwrap();
        store
            .companies()
            .upsert(&Company {
                cik: "1".to_string(),
                name: "A".to_string(),
                ticker: None,
                sic_code: None,
                sic_description: None,
                state_of_incorporation: None,
                fiscal_year_end: None,
                ein: None,
            })
            .unwrap();
        store.filings().upsert(&sample_filing("acc-1", "1", "10-K", "2024-11-01")).unwrap();

        store.sections().upsert(&sample_section()).unwrap();
        // Replacing the same (accession, section_type) is not an error
        store.sections().upsert(&sample_section()).unwrap();

        let loaded = store.sections().get("acc-1", "item_1a").unwrap().unwrap();
        assert_eq!(loaded.title, "Risk Factors");
        assert_eq!(loaded.cross_references.len(), 1);
        assert_eq!(loaded.heading_hierarchy, vec!["OVERVIEW"]);

        assert_eq!(store.sections().by_filing("acc-1").unwrap().len(), 1);
    }
}
