//! Concept-category repository.

use crate::connection::Store;
use finloom::error::Result;
use finloom::types::ConceptCategory;
use rusqlite::{OptionalExtension, params};

/// Grouped concept-category operations.
#[derive(Debug)]
pub struct ConceptRepository<'a> {
    store: &'a Store,
}

impl<'a> ConceptRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or refine a concept classification. Linkbase parses from
    /// later filings fill gaps without erasing what earlier parses learned.
    pub fn upsert(&self, category: &ConceptCategory) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO concept_categories (
                concept_name, section, parent_concept, depth, label, data_type, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, CURRENT_TIMESTAMP)
            ON CONFLICT(concept_name) DO UPDATE SET
                section = COALESCE(excluded.section, concept_categories.section),
                parent_concept = COALESCE(excluded.parent_concept, concept_categories.parent_concept),
                depth = COALESCE(excluded.depth, concept_categories.depth),
                label = COALESCE(excluded.label, concept_categories.label),
                data_type = COALESCE(excluded.data_type, concept_categories.data_type),
                updated_at = CURRENT_TIMESTAMP",
            params![
                category.concept_name,
                category.section,
                category.parent_concept,
                category.depth,
                category.label,
                category.data_type,
            ],
        )?;
        Ok(())
    }

    /// Look up one concept.
    pub fn get(&self, concept_name: &str) -> Result<Option<ConceptCategory>> {
        let category = self
            .store
            .conn()
            .query_row(
                "SELECT concept_name, section, parent_concept, depth, label, data_type
                 FROM concept_categories WHERE concept_name = ?1",
                params![concept_name],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// All concepts classified under a statement section.
    pub fn by_section(&self, section: &str) -> Result<Vec<ConceptCategory>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT concept_name, section, parent_concept, depth, label, data_type
             FROM concept_categories WHERE section = ?1 ORDER BY concept_name",
        )?;
        let rows = stmt.query_map(params![section], row_to_category)?;
        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }

    /// Distinct statement sections seen so far.
    pub fn sections(&self) -> Result<Vec<String>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT DISTINCT section FROM concept_categories
             WHERE section IS NOT NULL ORDER BY section",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut sections = Vec::new();
        for row in rows {
            sections.push(row?);
        }
        Ok(sections)
    }
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConceptCategory> {
    Ok(ConceptCategory {
        concept_name: row.get(0)?,
        section: row.get(1)?,
        parent_concept: row.get(2)?,
        depth: row.get(3)?,
        label: row.get(4)?,
        data_type: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_refines_without_erasing() {
        let store = Store::in_memory().unwrap();
        store
            .concepts()
            .upsert(&ConceptCategory {
                concept_name: "us-gaap:Assets".to_string(),
                section: Some("BalanceSheet".to_string()),
                parent_concept: None,
                depth: Some(1),
                label: None,
                data_type: None,
            })
            .unwrap();

        store
            .concepts()
            .upsert(&ConceptCategory {
                concept_name: "us-gaap:Assets".to_string(),
                section: None,
                parent_concept: None,
                depth: None,
                label: Some("Total assets".to_string()),
                data_type: Some("monetary".to_string()),
            })
            .unwrap();

        let loaded = store.concepts().get("us-gaap:Assets").unwrap().unwrap();
        assert_eq!(loaded.section.as_deref(), Some("BalanceSheet"));
        assert_eq!(loaded.label.as_deref(), Some("Total assets"));
        assert_eq!(loaded.depth, Some(1));
    }

    #[test]
    fn test_by_section_and_distinct_sections() {
        let store = Store::in_memory().unwrap();
        for (name, section) in [
            ("us-gaap:Assets", "BalanceSheet"),
            ("us-gaap:Liabilities", "BalanceSheet"),
            ("us-gaap:Revenues", "IncomeStatement"),
        ] {
            store
                .concepts()
                .upsert(&ConceptCategory {
                    concept_name: name.to_string(),
                    section: Some(section.to_string()),
                    parent_concept: None,
                    depth: None,
                    label: None,
                    data_type: None,
                })
                .unwrap();
        }

        assert_eq!(store.concepts().by_section("BalanceSheet").unwrap().len(), 2);
        assert_eq!(
            store.concepts().sections().unwrap(),
            vec!["BalanceSheet", "IncomeStatement"]
        );
    }
}
