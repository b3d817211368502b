//! Durable persistence for the recipient directory.
//!
//! The store is a whole-document contract: `load` returns the latest
//! directory snapshot (or nothing on first start), `save` replaces it.
//! No partial-key updates exist; the engine is the only writer.

pub mod error;
pub mod json;

pub use error::StoreError;
pub use json::{JsonFileStore, StateStore};
