//! Core types, configuration, logging and error taxonomy for the finloom
//! filing platform.
//!
//! Everything downstream (ingestion, parsing, storage, indexing, graph and
//! retrieval crates) builds on the records and configuration defined here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod roster;
pub mod types;

pub use config::FinloomConfig;
pub use error::{FinloomError, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
