//! Chunking and indexing: semantic chunks out of extracted sections,
//! dense vectors into the vector collection, documents into the keyword
//! index.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunker;
pub mod indexer;
pub mod keyword;
pub mod vector;

pub use chunker::Chunker;
pub use indexer::{EmbeddingCheckpoint, Indexer};
pub use keyword::KeywordIndex;
pub use vector::{FilingPayload, SearchFilters, VectorIndex, point_id_for};
