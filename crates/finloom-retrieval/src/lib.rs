//! Retrieval core: query routing and decomposition, hybrid seed retrieval
//! fusing vector, keyword and knowledge-graph primitives, multi-hop
//! expansion over the passage graph with LLM pruning, and final reranking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod decompose;
pub mod graph_search;
pub mod hoprag;
pub mod hybrid;
pub mod pruning;
pub mod router;

pub use context::Retriever;
pub use decompose::{DecompositionPlan, QueryDecomposer};
pub use graph_search::GraphSearch;
pub use hoprag::{HopRetriever, HopTrace};
pub use hybrid::HybridSearcher;
pub use pruning::{CandidatePruner, HopCandidate, KeepAllPruner, LlmPruner, PruningResult};
pub use router::{QueryRouter, QueryType, RoutingDecision};
