//! Provider clients shared across extraction, indexing, graph building and
//! retrieval: chat completions, embeddings and an optional reranker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chat;
pub mod embeddings;
pub mod rerank;

pub use chat::ChatClient;
pub use embeddings::{EmbeddingClient, cosine_similarity};
pub use rerank::RerankClient;
