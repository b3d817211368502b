use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("topic source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("malformed topic source: {0}")]
    MalformedSource(String),
}
