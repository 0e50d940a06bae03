//! Vector index over a qdrant collection.
//!
//! Point ids are deterministic UUIDv5 hashes of the chunk id, so upserts
//! are idempotent and a regenerated chunk overwrites its old vector. The
//! original chunk id rides in the payload for reverse lookup.

use finloom::config::VectorConfig;
use finloom::error::{FinloomError, Result};
use finloom::types::{Chunk, HitMetadata, SearchHit};
use qdrant_client::Payload;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder, value::Kind,
};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Filters accepted by both indexes.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to one ticker
    pub ticker: Option<String>,
    /// Restrict to one section item
    pub section_item: Option<String>,
}

impl SearchFilters {
    /// Filter on a ticker.
    pub fn ticker(ticker: &str) -> Self {
        Self { ticker: Some(ticker.to_string()), ..Default::default() }
    }

    fn to_qdrant(&self) -> Option<Filter> {
        let mut conditions = Vec::new();
        if let Some(ticker) = &self.ticker {
            conditions.push(Condition::matches("ticker", ticker.clone()));
        }
        if let Some(section) = &self.section_item {
            conditions.push(Condition::matches("section_item", section.clone()));
        }
        if conditions.is_empty() { None } else { Some(Filter::must(conditions)) }
    }
}

/// Extra filing-level payload attached to every point of a filing.
#[derive(Debug, Clone)]
pub struct FilingPayload {
    /// Company ticker
    pub ticker: String,
    /// Company name
    pub company_name: String,
    /// Filing date (ISO)
    pub filing_date: String,
    /// Form type
    pub form_type: String,
}

/// Client for the chunk vector collection.
pub struct VectorIndex {
    client: Qdrant,
    collection: String,
    dimension: u64,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

/// Deterministic point id for a chunk id.
pub fn point_id_for(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

impl VectorIndex {
    /// Connect to the vector store.
    pub fn connect(config: &VectorConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.dimension,
        })
    }

    /// Create the collection (cosine distance, fixed size) when absent.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        if exists {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        debug!(collection = %self.collection, "vector collection created");
        Ok(())
    }

    /// Idempotently upsert embedded chunks with their rich payload.
    pub async fn upsert_chunks(&self, chunks: &[Chunk], filing: &FilingPayload) -> Result<usize> {
        let mut points = Vec::new();
        for chunk in chunks {
            let Some(embedding) = &chunk.embedding else {
                warn!(chunk_id = %chunk.chunk_id, "chunk has no embedding, skipped");
                continue;
            };
            let payload: Payload = serde_json::json!({
                "chunk_id": chunk.chunk_id,
                "accession_number": chunk.accession_number,
                "ticker": filing.ticker,
                "company_name": filing.company_name,
                "filing_date": filing.filing_date,
                "form_type": filing.form_type,
                "section_item": chunk.section_item,
                "section_title": chunk.section_title,
                "chunk_index": chunk.chunk_index,
                "token_count": chunk.token_count,
                "contains_tables": chunk.contains_tables,
                "contains_lists": chunk.contains_lists,
                "contains_numbers": chunk.contains_numbers,
                "content": chunk.text,
            })
            .try_into()
            .map_err(|e| FinloomError::Validation(format!("payload conversion: {e}")))?;

            points.push(PointStruct::new(
                point_id_for(&chunk.chunk_id),
                embedding.clone(),
                payload,
            ));
        }
        let count = points.len();
        if count == 0 {
            return Ok(0);
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;
        Ok(count)
    }

    /// Nearest chunks to a query embedding.
    pub async fn search(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        let mut builder = SearchPointsBuilder::new(&self.collection, embedding, top_k as u64)
            .with_payload(true);
        if let Some(filter) = filters.to_qdrant() {
            builder = builder.filter(filter);
        }
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| hit_from_payload(&point.payload, f64::from(point.score)))
            .collect())
    }

    /// Fetch full content for chunk ids (hop enrichment).
    pub async fn fetch_by_chunk_ids(&self, chunk_ids: &[String]) -> Result<HashMap<String, String>> {
        let mut contents = HashMap::new();
        if chunk_ids.is_empty() {
            return Ok(contents);
        }
        let conditions: Vec<Condition> = chunk_ids
            .iter()
            .map(|id| Condition::matches("chunk_id", id.clone()))
            .collect();
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .filter(Filter::should(conditions))
                    .limit(chunk_ids.len() as u32)
                    .with_payload(true),
            )
            .await
            .map_err(|e| FinloomError::IndexUnavailable(e.to_string()))?;

        for point in response.result {
            let chunk_id = payload_str(&point.payload, "chunk_id");
            let content = payload_str(&point.payload, "content");
            if let (Some(chunk_id), Some(content)) = (chunk_id, content) {
                contents.insert(chunk_id, content);
            }
        }
        Ok(contents)
    }
}

fn payload_str(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<String> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    })
}

fn payload_i64(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<i64> {
    payload.get(key).and_then(|v| match &v.kind {
        Some(Kind::IntegerValue(i)) => Some(*i),
        _ => None,
    })
}

fn hit_from_payload(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    score: f64,
) -> SearchHit {
    let chunk_id = payload_str(payload, "chunk_id").unwrap_or_default();
    SearchHit {
        key: chunk_id.clone(),
        content: payload_str(payload, "content").unwrap_or_default(),
        score,
        metadata: HitMetadata {
            chunk_id: Some(chunk_id),
            ticker: payload_str(payload, "ticker"),
            company_name: payload_str(payload, "company_name"),
            section_item: payload_str(payload, "section_item"),
            section_title: payload_str(payload, "section_title"),
            filing_date: payload_str(payload, "filing_date"),
            accession_number: payload_str(payload, "accession_number"),
            fiscal_year: payload_i64(payload, "fiscal_year").map(|y| y as i32),
            sources: Vec::new(),
            hop_number: 0,
            edge_type: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_deterministic() {
        let a = point_id_for("acc_item_1_0");
        let b = point_id_for("acc_item_1_0");
        let c = point_id_for("acc_item_1_1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Valid UUID shape
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_filters_to_qdrant() {
        assert!(SearchFilters::default().to_qdrant().is_none());
        assert!(SearchFilters::ticker("AAPL").to_qdrant().is_some());
    }
}
