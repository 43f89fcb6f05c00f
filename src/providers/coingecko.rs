//! Crypto quote adapter backed by the CoinGecko API.
//!
//! The free tier rate-limits aggressively, so this adapter throttles
//! harder than the equity feed, batches all symbols into one call and
//! keeps quotes cached longer.

use crate::core::cache::Cache;
use crate::core::error::FetchError;
use crate::core::quote::{ClosePoint, HistorySpan, PriceQuote, QuoteProvider};
use crate::providers::util::{Throttle, with_backoff};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const QUOTE_TTL: Duration = Duration::from_secs(10 * 60);
const HISTORY_TTL: Duration = Duration::from_secs(30 * 60);
const MIN_CALL_INTERVAL: Duration = Duration::from_secs(3);
const BACKOFF_BASE: Duration = Duration::from_secs(10);
const MAX_RETRIES: usize = 3;

/// Ticker symbols translated to CoinGecko coin identifiers. Unknown
/// tickers are tried lowercased, which works for coins whose id matches
/// their name.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("ADA", "cardano"),
    ("DOT", "polkadot"),
    ("AVAX", "avalanche-2"),
    ("MATIC", "matic-network"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("ATOM", "cosmos"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("LTC", "litecoin"),
    ("XLM", "stellar"),
    ("ALGO", "algorand"),
    ("AAVE", "aave"),
    ("XMR", "monero"),
    ("NEAR", "near"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
];

fn coin_id(ticker: &str) -> String {
    let upper = ticker.to_uppercase();
    COIN_IDS
        .iter()
        .find(|(t, _)| *t == upper)
        .map_or_else(|| ticker.to_lowercase(), |(_, id)| id.to_string())
}

pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
    vs_currency: String,
    quote_cache: Cache<String, PriceQuote>,
    history_cache: Cache<String, Vec<ClosePoint>>,
    throttle: Throttle,
    retries: usize,
    backoff: Duration,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, vs_currency: &str) -> Self {
        CoinGeckoProvider {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            vs_currency: vs_currency.to_lowercase(),
            quote_cache: Cache::new(QUOTE_TTL),
            history_cache: Cache::new(HISTORY_TTL),
            throttle: Throttle::new(MIN_CALL_INTERVAL),
            retries: MAX_RETRIES,
            backoff: BACKOFF_BASE,
        }
    }

    /// Overrides the retry/throttle policy. Used by tests to avoid real
    /// backoff delays.
    pub fn with_policy(mut self, retries: usize, backoff: Duration, min_interval: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self.throttle = Throttle::new(min_interval);
        self
    }

    async fn fetch_simple_price(
        &self,
        ids: &str,
    ) -> Result<HashMap<String, HashMap<String, Option<f64>>>, FetchError> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true&include_market_cap=true",
            self.base_url, ids, self.vs_currency
        );
        debug!("Requesting crypto prices from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_request)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("HTTP {status} for ids {ids}")));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("simple/price response: {e}")))
    }

    async fn fetch_market_chart(
        &self,
        id: &str,
        days: u32,
    ) -> Result<MarketChartResponse, FetchError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}&interval=daily",
            self.base_url, id, self.vs_currency, days
        );
        debug!("Requesting crypto history from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::from_request)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Upstream(format!("HTTP {status} for {id}")));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("market_chart response: {e}")))
    }

    fn quote_from_coin_data(
        &self,
        ticker: &str,
        coin_data: &HashMap<String, Option<f64>>,
    ) -> Option<PriceQuote> {
        let price = coin_data.get(&self.vs_currency).copied().flatten()?;
        let change_24h = coin_data
            .get(&format!("{}_24h_change", self.vs_currency))
            .copied()
            .flatten()
            .unwrap_or(0.0);

        // The feed reports a 24h change instead of a previous close;
        // derive the close the change implies.
        let previous_close = if change_24h != 0.0 {
            price / (1.0 + change_24h / 100.0)
        } else {
            price
        };

        let mut quote = PriceQuote::from_prices(
            &ticker.to_uppercase(),
            price,
            previous_close,
            &self.vs_currency.to_uppercase(),
        );
        quote.name = Some(ticker.to_uppercase());
        quote.market_cap = coin_data
            .get(&format!("{}_market_cap", self.vs_currency))
            .copied()
            .flatten();
        Some(quote)
    }
}

#[async_trait]
impl QuoteProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoQuote", skip(self), fields(ticker = %ticker))]
    async fn get_quote(&self, ticker: &str) -> Result<PriceQuote, FetchError> {
        let cache_key = ticker.to_uppercase();
        if let Some(cached) = self.quote_cache.get(&cache_key).await {
            return Ok(cached);
        }

        self.throttle.wait().await;
        let id = coin_id(ticker);

        let data = with_backoff(
            || self.fetch_simple_price(&id),
            self.retries,
            self.backoff,
        )
        .await
        .map_err(|e| match e {
            FetchError::RateLimited => {
                warn!("Rate limit persisted for {ticker}, reporting not found");
                FetchError::NotFound(ticker.to_string())
            }
            other => other,
        })?;

        let quote = data
            .get(&id)
            .and_then(|coin_data| self.quote_from_coin_data(ticker, coin_data))
            .ok_or_else(|| FetchError::NotFound(ticker.to_string()))?;

        self.quote_cache.put(cache_key, quote.clone()).await;
        Ok(quote)
    }

    async fn get_quotes(&self, tickers: &[String]) -> HashMap<String, PriceQuote> {
        let mut results = HashMap::new();
        let mut to_fetch = Vec::new();

        for ticker in tickers {
            match self.quote_cache.get(&ticker.to_uppercase()).await {
                Some(quote) => {
                    results.insert(ticker.clone(), quote);
                }
                None => to_fetch.push(ticker.clone()),
            }
        }
        if to_fetch.is_empty() {
            return results;
        }

        self.throttle.wait().await;

        // One batched call for everything not cached.
        let ids: Vec<String> = to_fetch.iter().map(|t| coin_id(t)).collect();
        let joined = ids.join(",");
        let data = match with_backoff(
            || self.fetch_simple_price(&joined),
            self.retries,
            self.backoff,
        )
        .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!("Batch crypto fetch failed: {e}");
                return results;
            }
        };

        for (ticker, id) in to_fetch.iter().zip(&ids) {
            match data
                .get(id)
                .and_then(|coin_data| self.quote_from_coin_data(ticker, coin_data))
            {
                Some(quote) => {
                    self.quote_cache
                        .put(ticker.to_uppercase(), quote.clone())
                        .await;
                    results.insert(ticker.clone(), quote);
                }
                None => debug!("No data for {ticker} (coin id {id}) in batch response"),
            }
        }
        results
    }

    #[instrument(name = "CoinGeckoHistory", skip(self), fields(ticker = %ticker, span = %span))]
    async fn get_history(
        &self,
        ticker: &str,
        span: HistorySpan,
    ) -> Result<Vec<ClosePoint>, FetchError> {
        let cache_key = format!("{}:{span}", ticker.to_uppercase());
        if let Some(cached) = self.history_cache.get(&cache_key).await {
            return Ok(cached);
        }

        self.throttle.wait().await;
        let id = coin_id(ticker);

        let data = with_backoff(
            || self.fetch_market_chart(&id, span.days()),
            self.retries,
            self.backoff,
        )
        .await
        .map_err(|e| match e {
            FetchError::RateLimited => FetchError::NotFound(ticker.to_string()),
            other => other,
        })?;

        let history: Vec<ClosePoint> = data
            .prices
            .iter()
            .filter_map(|point| {
                let [ts_ms, price] = point.as_slice() else {
                    return None;
                };
                let date = Utc
                    .timestamp_millis_opt(*ts_ms as i64)
                    .single()?
                    .date_naive();
                Some(ClosePoint { date, close: *price })
            })
            .collect();

        if history.is_empty() {
            return Err(FetchError::NotFound(ticker.to_string()));
        }

        self.history_cache.put(cache_key, history.clone()).await;
        Ok(history)
    }
}

#[derive(Deserialize, Debug)]
struct MarketChartResponse {
    prices: Vec<Vec<f64>>,
}
