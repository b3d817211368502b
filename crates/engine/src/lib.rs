//! The subscription/notification scheduling engine.
//!
//! This crate provides:
//! - selection merging into per-recipient notification records
//! - pure due evaluation against the current time
//! - the dispatch coordinator with at-most-once delivery per due cycle
//! - the engine owning the directory behind load-modify-save

pub mod dispatch;
pub mod due;
pub mod engine;
pub mod merge;
#[cfg(test)]
mod tests;

pub use dispatch::{DeliveryResult, ScanReport};
pub use due::{due_status, DueStatus};
pub use engine::Engine;
pub use merge::merge_selection;
