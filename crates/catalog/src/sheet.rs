use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::CatalogError;

/// Supplier of the current set of known topic names.
#[async_trait]
pub trait TopicSource: Send + Sync {
    /// Fetch a fresh topic snapshot from `locator`.
    async fn fetch(&self, locator: &str) -> Result<Vec<String>, CatalogError>;
}

/// Fetches topics from a published spreadsheet's CSV export.
///
/// `locator` is either a full spreadsheet URL or a bare spreadsheet id;
/// topic names are the unique values of the third column.
pub struct SheetSource {
    client: reqwest::Client,
}

impl SheetSource {
    /// Build a source with a bounded fetch timeout. Fails if the HTTP
    /// client cannot be constructed; there is no untimed fallback.
    pub fn new() -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TopicSource for SheetSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<String>, CatalogError> {
        let url = export_url(locator);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::SourceUnavailable(e.to_string()))?;

        let topics = parse_topics(&body)?;
        info!(count = topics.len(), "topics loaded from sheet");
        Ok(topics)
    }
}

/// CSV export URL for a spreadsheet locator. Full URLs have their id
/// extracted; anything else is treated as a bare id.
fn export_url(locator: &str) -> String {
    let id = match locator.split_once("spreadsheets/d/") {
        Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
        None => locator,
    };
    format!("https://docs.google.com/spreadsheets/d/{id}/export?format=csv")
}

/// Extract topic names from sheet CSV: header row skipped, third column,
/// blank cells dropped, first-seen order, de-duplicated.
// TODO: switch to a real CSV parser if topic names ever carry quoted commas.
pub fn parse_topics(csv: &str) -> Result<Vec<String>, CatalogError> {
    let mut rows = csv.lines().filter(|l| !l.trim().is_empty());

    let header = rows
        .next()
        .ok_or_else(|| CatalogError::MalformedSource("sheet is empty".to_string()))?;

    let columns = header.split(',').count();
    if columns < 3 {
        return Err(CatalogError::MalformedSource(format!(
            "sheet has fewer than 3 columns (found {columns})"
        )));
    }

    let mut topics: Vec<String> = Vec::new();
    for row in rows {
        let Some(cell) = row.split(',').nth(2) else {
            continue;
        };
        let topic = cell.trim();
        if topic.is_empty() || topics.iter().any(|t| t == topic) {
            continue;
        }
        topics.push(topic.to_string());
    }

    Ok(topics)
}
