//! Company repository.

use crate::connection::Store;
use finloom::error::Result;
use finloom::types::Company;
use rusqlite::{OptionalExtension, params};

/// Grouped company operations.
#[derive(Debug)]
pub struct CompanyRepository<'a> {
    store: &'a Store,
}

impl<'a> CompanyRepository<'a> {
    pub(crate) const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert or refresh a company. Refresh preserves previously known
    /// values when the new row carries nulls.
    pub fn upsert(&self, company: &Company) -> Result<()> {
        self.store.conn().execute(
            "INSERT INTO companies (
                cik, name, ticker, sic_code, sic_description,
                state_of_incorporation, fiscal_year_end, ein, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, CURRENT_TIMESTAMP)
            ON CONFLICT(cik) DO UPDATE SET
                name = excluded.name,
                ticker = COALESCE(excluded.ticker, companies.ticker),
                sic_code = COALESCE(excluded.sic_code, companies.sic_code),
                sic_description = COALESCE(excluded.sic_description, companies.sic_description),
                state_of_incorporation = COALESCE(excluded.state_of_incorporation, companies.state_of_incorporation),
                fiscal_year_end = COALESCE(excluded.fiscal_year_end, companies.fiscal_year_end),
                ein = COALESCE(excluded.ein, companies.ein),
                updated_at = CURRENT_TIMESTAMP",
            params![
                company.cik,
                company.name,
                company.ticker,
                company.sic_code,
                company.sic_description,
                company.state_of_incorporation,
                company.fiscal_year_end,
                company.ein,
            ],
        )?;
        Ok(())
    }

    /// Fetch one company by CIK.
    pub fn get(&self, cik: &str) -> Result<Option<Company>> {
        let company = self
            .store
            .conn()
            .query_row(
                "SELECT cik, name, ticker, sic_code, sic_description,
                        state_of_incorporation, fiscal_year_end, ein
                 FROM companies WHERE cik = ?1",
                params![cik],
                row_to_company,
            )
            .optional()?;
        Ok(company)
    }

    /// All companies ordered by ticker.
    pub fn list_all(&self) -> Result<Vec<Company>> {
        let mut stmt = self.store.conn().prepare(
            "SELECT cik, name, ticker, sic_code, sic_description,
                    state_of_incorporation, fiscal_year_end, ein
             FROM companies ORDER BY ticker",
        )?;
        let rows = stmt.query_map([], row_to_company)?;
        let mut companies = Vec::new();
        for row in rows {
            companies.push(row?);
        }
        Ok(companies)
    }
}

fn row_to_company(row: &rusqlite::Row<'_>) -> rusqlite::Result<Company> {
    Ok(Company {
        cik: row.get(0)?,
        name: row.get(1)?,
        ticker: row.get(2)?,
        sic_code: row.get(3)?,
        sic_description: row.get(4)?,
        state_of_incorporation: row.get(5)?,
        fiscal_year_end: row.get(6)?,
        ein: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(cik: &str, ticker: &str) -> Company {
        Company {
            cik: cik.to_string(),
            name: format!("{ticker} Inc."),
            ticker: Some(ticker.to_string()),
            sic_code: Some("3571".to_string()),
            sic_description: None,
            state_of_incorporation: Some("CA".to_string()),
            fiscal_year_end: Some("0928".to_string()),
            ein: None,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = Store::in_memory().unwrap();
        store.companies().upsert(&company("0000320193", "AAPL")).unwrap();

        let loaded = store.companies().get("0000320193").unwrap().unwrap();
        assert_eq!(loaded.ticker.as_deref(), Some("AAPL"));
        assert_eq!(loaded.sic_code.as_deref(), Some("3571"));
    }

    #[test]
    fn test_upsert_preserves_non_null_prior_values() {
        let store = Store::in_memory().unwrap();
        store.companies().upsert(&company("0000320193", "AAPL")).unwrap();

        // Refresh with sparse data must not wipe known fields
        let sparse = Company {
            cik: "0000320193".to_string(),
            name: "Apple Inc.".to_string(),
            ticker: None,
            sic_code: None,
            sic_description: None,
            state_of_incorporation: None,
            fiscal_year_end: None,
            ein: Some("942404110".to_string()),
        };
        store.companies().upsert(&sparse).unwrap();

        let loaded = store.companies().get("0000320193").unwrap().unwrap();
        assert_eq!(loaded.name, "Apple Inc.");
        assert_eq!(loaded.ticker.as_deref(), Some("AAPL"));
        assert_eq!(loaded.sic_code.as_deref(), Some("3571"));
        assert_eq!(loaded.ein.as_deref(), Some("942404110"));
    }

    #[test]
    fn test_list_all_ordered_by_ticker() {
        let store = Store::in_memory().unwrap();
        store.companies().upsert(&company("2", "MSFT")).unwrap();
        store.companies().upsert(&company("1", "AAPL")).unwrap();
        store.companies().upsert(&company("3", "AMD")).unwrap();

        let tickers: Vec<String> = store
            .companies()
            .list_all()
            .unwrap()
            .into_iter()
            .filter_map(|c| c.ticker)
            .collect();
        assert_eq!(tickers, vec!["AAPL", "AMD", "MSFT"]);
    }
}
