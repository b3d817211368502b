//! Topic catalog import.
//!
//! Topic names live in an externally maintained spreadsheet; the core
//! only ever consumes a snapshot of strings. This crate fetches the
//! published CSV export and extracts the topic column.

pub mod error;
pub mod sheet;

pub use error::CatalogError;
pub use sheet::{parse_topics, SheetSource, TopicSource};
