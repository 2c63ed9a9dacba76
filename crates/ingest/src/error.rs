use thiserror::Error;

/// Failure modes of the scraping pipeline.
///
/// Only `UpstreamUnavailable` escapes a chamber scrape; the others are
/// absorbed at the parser, counter or enrichment boundary.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
    #[error("expected markup `{0}` not found")]
    StructureMissing(String),
    #[error("host of {0} is not allow-listed")]
    DisallowedHost(String),
    #[error("roster unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl ScrapeError {
    /// Worth another attempt against the same URL.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::Network { .. })
    }

    pub fn network(url: &str, reason: impl ToString) -> Self {
        ScrapeError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;
