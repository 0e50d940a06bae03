//! Store connection and schema bootstrap.
//!
//! One writer per database file. Readers may open additional read-only
//! connections; write-ahead logging keeps them consistent with the writer.

use crate::analytics::AnalyticsRepository;
use crate::companies::CompanyRepository;
use crate::concepts::ConceptRepository;
use crate::facts::FactRepository;
use crate::filings::FilingRepository;
use crate::normalization::NormalizationRepository;
use crate::sections::SectionRepository;
use finloom::error::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Embedded analytical store.
///
/// The caller owns the single writer connection; repositories are cheap
/// facades borrowing it.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the store at `path` as the single writer.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    /// Open a read-only connection to an existing store.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// In-memory store (tests).
    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        // WAL for crash recovery; a no-op on in-memory connections
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(SCHEMA_SQL)?;
        debug!("store schema initialized");
        Ok(Self { conn })
    }

    /// Raw connection for repositories in this crate.
    pub(crate) const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Company repository.
    pub const fn companies(&self) -> CompanyRepository<'_> {
        CompanyRepository::new(self)
    }

    /// Filing repository.
    pub const fn filings(&self) -> FilingRepository<'_> {
        FilingRepository::new(self)
    }

    /// Fact repository.
    pub const fn facts(&self) -> FactRepository<'_> {
        FactRepository::new(self)
    }

    /// Section repository.
    pub const fn sections(&self) -> SectionRepository<'_> {
        SectionRepository::new(self)
    }

    /// Concept-category repository.
    pub const fn concepts(&self) -> ConceptRepository<'_> {
        ConceptRepository::new(self)
    }

    /// Analytics repository.
    pub const fn analytics(&self) -> AnalyticsRepository<'_> {
        AnalyticsRepository::new(self)
    }

    /// Normalization repository.
    pub const fn normalization(&self) -> NormalizationRepository<'_> {
        NormalizationRepository::new(self)
    }
}
