//! Rate-limited, resumable ingestion of annual filings.
//!
//! The [`governor::RateGovernor`] paces every outbound call, the
//! [`archive::ArchiveClient`] wraps the archive's JSON endpoints, and the
//! [`downloader::Downloader`] materializes filtered document sets with
//! per-company checkpoints.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod checkpoint;
pub mod downloader;
pub mod governor;

pub use archive::{ArchiveClient, FilingDescriptor};
pub use checkpoint::DownloadCheckpoint;
pub use downloader::Downloader;
pub use governor::{RateGovernor, SharedGovernor};
