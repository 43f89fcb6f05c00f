//! Error taxonomy for feed adapters and the flat-file stores.

use thiserror::Error;

/// Failure modes of an external market-data fetch.
///
/// Everything except `NotFound` is transient in some sense; the providers
/// translate the other variants into `NotFound` once their fallbacks and
/// retries are exhausted, so the valuation engine only ever has to degrade
/// to a price-of-last-resort.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data found for {0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Maps a transport-level error to the taxonomy.
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.status().is_some_and(|s| s.as_u16() == 429) {
            FetchError::RateLimited
        } else {
            FetchError::Upstream(err.to_string())
        }
    }
}

/// Failure modes of the position ledger and value history stores.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid position: {0}")]
    InvalidInput(String),

    #[error("position not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
