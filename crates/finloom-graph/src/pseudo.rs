//! Pseudo-query edge generation.
//!
//! For each chunk, an LLM drafts three follow-up questions from the chunk
//! text; each question is embedded and searched against the vector index,
//! and sufficiently similar neighbors become `pseudo_query` edges.
//! Generation runs under a semaphore; edge addition back into the graph is
//! serialized on the driver, and a checkpoint is persisted every 500
//! chunks so interrupted runs resume.

use crate::passage::PassageGraph;
use chrono::Utc;
use finloom::error::Result;
use futures::future::join_all;
use finloom_index::{SearchFilters, VectorIndex};
use finloom_llm::{ChatClient, EmbeddingClient};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Questions generated per chunk.
const QUESTIONS_PER_CHUNK: usize = 3;
/// Chunk text is truncated to this many characters before prompting.
const PROMPT_TEXT_LIMIT: usize = 1500;
/// Vector-search neighbors considered per question.
const NEIGHBORS_PER_QUESTION: usize = 5;
/// Checkpoint flush interval, in chunks.
const CHECKPOINT_INTERVAL: usize = 500;

const QUESTION_SYSTEM_PROMPT: &str = "Given a passage from an annual filing, write three \
follow-up questions a financial analyst would ask next. Respond with JSON: \
{\"questions\": [str, str, str]}";

#[derive(Debug, Deserialize)]
struct GeneratedQuestions {
    #[serde(default)]
    questions: Vec<String>,
}

/// Progress file for pseudo-query generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PseudoQueryCheckpoint {
    /// Chunks already processed
    #[serde(default)]
    pub processed_chunk_ids: Vec<String>,
    /// Last write time (ISO)
    #[serde(default)]
    pub timestamp: String,
}

impl PseudoQueryCheckpoint {
    /// Checkpoint path under the progress directory.
    pub fn path_for(progress_dir: &Path) -> PathBuf {
        progress_dir.join("pseudo_query_checkpoint.json")
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
}

/// Outcome of a generation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PseudoQueryReport {
    /// Chunks processed this run
    pub chunks_processed: usize,
    /// Chunks skipped via the checkpoint
    pub chunks_skipped: usize,
    /// Edges added
    pub edges_added: usize,
    /// Chunks whose generation failed (logged and skipped)
    pub failures: usize,
}

/// Drives pseudo-query edge generation over a built passage graph.
#[derive(Debug)]
pub struct PseudoQueryGenerator<'a> {
    chat: &'a ChatClient,
    embeddings: &'a EmbeddingClient,
    vector: &'a VectorIndex,
    progress_dir: PathBuf,
    min_similarity: f64,
    max_concurrency: usize,
}

impl<'a> PseudoQueryGenerator<'a> {
    /// Generator over the given clients.
    pub fn new(
        chat: &'a ChatClient,
        embeddings: &'a EmbeddingClient,
        vector: &'a VectorIndex,
        progress_dir: PathBuf,
        min_similarity: f64,
        max_concurrency: usize,
    ) -> Self {
        Self {
            chat,
            embeddings,
            vector,
            progress_dir,
            min_similarity,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Generate questions and link edges for every node in the graph,
    /// resuming from the checkpoint.
    ///
    /// `chunk_texts` supplies each chunk's full text, keyed by chunk id
    /// (the graph itself holds only previews).
    pub async fn run(
        &self,
        graph: &mut PassageGraph,
        chunk_texts: &std::collections::HashMap<String, String>,
    ) -> Result<PseudoQueryReport> {
        let mut checkpoint = PseudoQueryCheckpoint::load(&self.progress_dir)?;
        let processed: HashSet<String> = checkpoint.processed_chunk_ids.iter().cloned().collect();

        let mut pending: Vec<String> = chunk_texts
            .keys()
            .filter(|id| graph.contains_node(id) && !processed.contains(*id))
            .cloned()
            .collect();
        pending.sort();

        let mut report = PseudoQueryReport {
            chunks_skipped: processed.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        for batch in pending.chunks(CHECKPOINT_INTERVAL) {
            // Fan out generation, bounded by the semaphore; collect the
            // target lists and apply them to the graph serially
            let tasks: Vec<_> = batch
                .iter()
                .map(|chunk_id| {
                    let semaphore = Arc::clone(&semaphore);
                    let text = chunk_texts.get(chunk_id).cloned().unwrap_or_default();
                    let chunk_id = chunk_id.clone();
                    async move {
                        let _permit =
                            semaphore.acquire_owned().await.expect("semaphore open");
                        let result = self.targets_for_chunk(chunk_id.clone(), text).await;
                        (chunk_id, result)
                    }
                })
                .collect();

            let results = join_all(tasks).await;
            for (chunk_id, result) in results {
                match result {
                    Ok(targets) => {
                        report.edges_added +=
                            graph.add_pseudo_query_edges(&chunk_id, &targets, self.min_similarity);
                    }
                    Err(e) => {
                        warn!(chunk_id = %chunk_id, error = %e, "pseudo-query generation failed");
                        report.failures += 1;
                    }
                }
                report.chunks_processed += 1;
                checkpoint.processed_chunk_ids.push(chunk_id);
            }
            checkpoint.save(&self.progress_dir)?;
        }

        info!(
            processed = report.chunks_processed,
            skipped = report.chunks_skipped,
            edges = report.edges_added,
            failures = report.failures,
            "pseudo-query generation complete"
        );
        Ok(report)
    }

    /// Questions for one chunk, embedded and searched; returns
    /// `(target_chunk_id, similarity)` pairs.
    async fn targets_for_chunk(
        &self,
        chunk_id: String,
        text: String,
    ) -> Result<Vec<(String, f64)>> {
        let excerpt: String = text.chars().take(PROMPT_TEXT_LIMIT).collect();
        let generated: GeneratedQuestions =
            self.chat.complete_json(QUESTION_SYSTEM_PROMPT, &excerpt).await?;

        let questions: Vec<String> = generated
            .questions
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .take(QUESTIONS_PER_CHUNK)
            .collect();
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embeddings.embed(&questions).await?;
        let mut targets = Vec::new();
        for vector in vectors {
            let hits = self
                .vector
                .search(vector, NEIGHBORS_PER_QUESTION, &SearchFilters::default())
                .await?;
            for hit in hits {
                if let Some(target) = hit.metadata.chunk_id {
                    if target != chunk_id {
                        targets.push((target, hit.score));
                    }
                }
            }
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = PseudoQueryCheckpoint::default();
        checkpoint.processed_chunk_ids.push("c1".to_string());
        checkpoint.save(dir.path()).unwrap();

        let loaded = PseudoQueryCheckpoint::load(dir.path()).unwrap();
        assert_eq!(loaded.processed_chunk_ids, vec!["c1"]);
        assert!(!loaded.timestamp.is_empty());
    }

    #[test]
    fn test_missing_checkpoint_defaults_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PseudoQueryCheckpoint::load(dir.path()).unwrap();
        assert!(loaded.processed_chunk_ids.is_empty());
    }
}
