use thiserror::Error;

use crate::model::RecipientId;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("recipient already exists: {0}")]
    DuplicateRecipient(String),

    #[error("recipient not found: {0}")]
    NotFound(RecipientId),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("topic source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed topic source: {0}")]
    MalformedSource(String),

    #[error("state store error: {0}")]
    Store(String),
}
