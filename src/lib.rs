#![warn(missing_docs)]
//! Export Redmine bugs to Bugzilla-importable XML.
//!
//! The crate scrapes Redmine issue pages rendered as HTML, extracts a
//! structured [`BugRecord`] per bug (metadata, description, change history,
//! attachments), and re-serializes the records into Bugzilla's XML import
//! format, attachments inlined as base64.
//!
//! The pipeline is a small, sequential data flow: fetch a page, parse the
//! meaningful HTML fragments, normalize free text, map the Redmine
//! vocabulary into Bugzilla's, and stream out one well-formed document.

pub mod config;
pub mod export;
pub mod fetch;
pub mod mapping;
pub mod record;
pub mod scrape;
pub mod text;
pub mod xml;

pub use config::{ConfigError, ExportConfig};
pub use export::{export_bugs, BugFailure, ExportOutcome};
pub use fetch::{Fetch, FetchError, FetchedResource, HttpFetcher};
pub use mapping::Mapper;
pub use record::{AttachmentRecord, BugRecord};
pub use scrape::{scrape_bug, scrape_issue, ParseError, ScrapeError};
pub use text::{normalize_element, normalize_fragment};
pub use xml::XmlExporter;
