//! Structured extraction from downloaded filings: XBRL facts with linkbase
//! enrichment, HTML section extraction with markdown markers, and entity
//! reading over section text.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod sections;
pub mod xbrl;

pub use entities::{EntityReader, SectionEntities};
pub use sections::{FullMarkdownResult, SectionExtractor};
pub use xbrl::{XbrlParseResult, parse_filing};
