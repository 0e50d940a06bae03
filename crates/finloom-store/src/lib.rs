//! Embedded analytical store for companies, filings, facts, sections and
//! normalized metrics.
//!
//! One writer per database file; repositories are facades over the shared
//! connection and consumers never see raw SQL. The normalization engine
//! ([`normalize::normalize_all`]) resolves canonical metrics from each
//! company-year's winning filing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod companies;
pub mod concepts;
mod connection;
pub mod facts;
pub mod filings;
pub mod normalization;
pub mod normalize;
pub mod sections;

pub use connection::Store;
pub use filings::{FilingStatusUpdate, ProcessingKind};
pub use normalization::{DedupStats, LatestFiling, UpsertOutcome};
pub use normalize::{NormalizationReport, normalize_all, seed_standard_metrics};
