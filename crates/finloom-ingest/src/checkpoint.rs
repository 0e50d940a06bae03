//! Per-company download checkpoints.
//!
//! One JSON file per company at `{checkpoint_dir}/download_{cik}.json`,
//! rewritten after every filing so a crash resumes at exactly the next one.

use chrono::{DateTime, Utc};
use finloom::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Crash-consistent download progress for one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadCheckpoint {
    /// 10-digit zero-padded CIK
    pub cik: String,
    /// Most recently attempted accession
    #[serde(default)]
    pub last_accession_number: Option<String>,
    /// Accessions downloaded and verified
    #[serde(default)]
    pub completed_filings: Vec<String>,
    /// Accessions that failed
    #[serde(default)]
    pub failed_filings: Vec<String>,
    /// Last write time
    pub timestamp: DateTime<Utc>,
}

impl DownloadCheckpoint {
    /// Fresh checkpoint for a company.
    pub fn new(cik: &str) -> Self {
        Self {
            cik: finloom::types::Company::pad_cik(cik),
            last_accession_number: None,
            completed_filings: Vec::new(),
            failed_filings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Checkpoint file path for a company.
    pub fn path_for(checkpoint_dir: &Path, cik: &str) -> PathBuf {
        checkpoint_dir.join(format!("download_{}.json", finloom::types::Company::pad_cik(cik)))
    }

    /// Load the checkpoint for `cik`, when one exists.
    pub fn load(checkpoint_dir: &Path, cik: &str) -> Result<Option<Self>> {
        let path = Self::path_for(checkpoint_dir, cik);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Persist the checkpoint, refreshing its timestamp.
    pub fn save(&mut self, checkpoint_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(checkpoint_dir)?;
        self.timestamp = Utc::now();
        let path = Self::path_for(checkpoint_dir, &self.cik);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Record a completed filing.
    pub fn mark_completed(&mut self, accession: &str) {
        self.last_accession_number = Some(accession.to_string());
        if !self.completed_filings.iter().any(|a| a == accession) {
            self.completed_filings.push(accession.to_string());
        }
        self.failed_filings.retain(|a| a != accession);
    }

    /// Record a failed filing.
    pub fn mark_failed(&mut self, accession: &str) {
        self.last_accession_number = Some(accession.to_string());
        if !self.failed_filings.iter().any(|a| a == accession) {
            self.failed_filings.push(accession.to_string());
        }
    }

    /// True when the filing was already downloaded and verified.
    pub fn is_completed(&self, accession: &str) -> bool {
        self.completed_filings.iter().any(|a| a == accession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = DownloadCheckpoint::new("320193");
        checkpoint.mark_completed("0000320193-24-000123");
        checkpoint.mark_failed("0000320193-23-000106");
        checkpoint.save(dir.path()).unwrap();

        let loaded = DownloadCheckpoint::load(dir.path(), "320193").unwrap().unwrap();
        assert_eq!(loaded.cik, "0000320193");
        assert_eq!(loaded.completed_filings, vec!["0000320193-24-000123"]);
        assert_eq!(loaded.failed_filings, vec!["0000320193-23-000106"]);
        assert!(loaded.is_completed("0000320193-24-000123"));
    }

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DownloadCheckpoint::load(dir.path(), "320193").unwrap().is_none());
    }

    #[test]
    fn test_retry_after_failure_clears_failed() {
        let mut checkpoint = DownloadCheckpoint::new("320193");
        checkpoint.mark_failed("acc-1");
        checkpoint.mark_completed("acc-1");
        assert!(checkpoint.failed_filings.is_empty());
        assert!(checkpoint.is_completed("acc-1"));
    }

    #[test]
    fn test_no_duplicate_entries() {
        let mut checkpoint = DownloadCheckpoint::new("320193");
        checkpoint.mark_completed("acc-1");
        checkpoint.mark_completed("acc-1");
        assert_eq!(checkpoint.completed_filings.len(), 1);
    }
}
