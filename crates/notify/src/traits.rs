//! Transport trait definition and shared error type.

use async_trait::async_trait;

/// Errors that can occur during email delivery.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("send timed out after {0}s")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Seam to the email delivery collaborator.
///
/// A send is a single synchronous attempt bounded by the transport's
/// configured timeout; retrying is the caller's decision (the periodic
/// scan naturally retries on the next cycle).
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}
