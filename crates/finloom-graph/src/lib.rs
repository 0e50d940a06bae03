//! Graph layers: the knowledge graph (entities, filings, metrics in an
//! embedded property-graph store, with community detection and LLM
//! summaries) and the in-memory passage graph over chunks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod community;
pub mod passage;
pub mod property;
pub mod pseudo;

pub use builder::{BuildStats, GraphBuilder};
pub use community::{CommunityAssignment, CommunitySummary, detect_communities, summarize_communities};
pub use passage::{EdgeKind, GraphStats, PassageEdge, PassageGraph, PassageNode};
pub use property::{PropertyGraph, RelationshipSpec};
pub use pseudo::{PseudoQueryCheckpoint, PseudoQueryGenerator, PseudoQueryReport};
