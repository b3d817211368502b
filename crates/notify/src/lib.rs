//! Email delivery for topic notifications.
//!
//! This crate provides:
//! - `EmailTransport` trait for the delivery seam (mockable in tests)
//! - lettre-backed SMTP implementation with TLS and a bounded timeout
//! - subject/body composition for topic-update messages

pub mod compose;
pub mod smtp;
pub mod traits;

pub use compose::compose;
pub use smtp::SmtpTransport;
pub use traits::{EmailTransport, TransportError};
