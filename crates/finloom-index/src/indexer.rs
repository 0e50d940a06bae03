//! Embedding + index population driver.
//!
//! Embeds chunks in provider batches, upserts them into the vector
//! collection, adds them to the keyword index, and records a progress
//! checkpoint per filing so interrupted runs resume without re-embedding.

use crate::keyword::KeywordIndex;
use crate::vector::{FilingPayload, VectorIndex};
use chrono::Utc;
use finloom::error::Result;
use finloom::types::Chunk;
use finloom_llm::EmbeddingClient;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Embedding progress, one file for the whole corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingCheckpoint {
    /// Accessions fully embedded and indexed
    #[serde(default)]
    pub completed_accessions: Vec<String>,
    /// Total tokens billed so far
    #[serde(default)]
    pub total_tokens: u64,
    /// Last write time (ISO)
    #[serde(default)]
    pub timestamp: String,
}

impl EmbeddingCheckpoint {
    /// Checkpoint path under the progress directory.
    pub fn path_for(progress_dir: &Path) -> PathBuf {
        progress_dir.join("embeddings_checkpoint.json")
    }

    /// Load the checkpoint, defaulting to empty.
    pub fn load(progress_dir: &Path) -> Result<Self> {
        let path = Self::path_for(progress_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// Persist the checkpoint.
    pub fn save(&mut self, progress_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(progress_dir)?;
        self.timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        std::fs::write(Self::path_for(progress_dir), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Whether a filing was already indexed.
    pub fn is_done(&self, accession: &str) -> bool {
        self.completed_accessions.iter().any(|a| a == accession)
    }

    /// Record a finished filing.
    pub fn mark_done(&mut self, accession: &str) {
        if !self.is_done(accession) {
            self.completed_accessions.push(accession.to_string());
        }
    }
}

/// Populates the vector and keyword indexes from chunked filings.
#[derive(Debug)]
pub struct Indexer<'a> {
    embeddings: &'a EmbeddingClient,
    vector: &'a VectorIndex,
    keyword: &'a KeywordIndex,
    progress_dir: PathBuf,
}

impl<'a> Indexer<'a> {
    /// Driver over the given clients.
    pub fn new(
        embeddings: &'a EmbeddingClient,
        vector: &'a VectorIndex,
        keyword: &'a KeywordIndex,
        progress_dir: PathBuf,
    ) -> Self {
        Self { embeddings, vector, keyword, progress_dir }
    }

    /// Embed and index one filing's chunks as an atomic set.
    ///
    /// Skips filings the checkpoint already records. Chunk vectors key on
    /// the stable chunk id, so a forced re-run overwrites cleanly.
    pub async fn index_filing(
        &self,
        accession: &str,
        mut chunks: Vec<Chunk>,
        filing: &FilingPayload,
        force: bool,
    ) -> Result<usize> {
        let mut checkpoint = EmbeddingCheckpoint::load(&self.progress_dir)?;
        if !force && checkpoint.is_done(accession) {
            info!(accession, "filing already embedded, skipped");
            return Ok(0);
        }
        if chunks.is_empty() {
            checkpoint.mark_done(accession);
            checkpoint.save(&self.progress_dir)?;
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        self.vector.ensure_collection().await?;
        let upserted = self.vector.upsert_chunks(&chunks, filing).await?;
        self.keyword.add_chunks(&chunks, filing)?;

        checkpoint.mark_done(accession);
        checkpoint.total_tokens = self.embeddings.total_tokens();
        checkpoint.save(&self.progress_dir)?;

        info!(accession, chunks = upserted, "filing indexed");
        Ok(upserted)
    }
}
