//! Equity/ETF quote adapter backed by the Yahoo Finance chart API, with a
//! transparent fallback to the v7 quote endpoint when the chart call fails.

use crate::core::cache::Cache;
use crate::core::error::FetchError;
use crate::core::quote::{ClosePoint, HistorySpan, PriceQuote, QuoteProvider};
use crate::providers::util::{Throttle, with_backoff};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const QUOTE_TTL: Duration = Duration::from_secs(15 * 60);
const HISTORY_TTL: Duration = Duration::from_secs(30 * 60);
const MIN_CALL_INTERVAL: Duration = Duration::from_millis(500);
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const MAX_RETRIES: usize = 3;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36";

/// Some European ETF tickers have no usable quote on their home exchange
/// and must be queried via an equivalent listing elsewhere. The returned
/// quote is relabeled back to the input ticker.
const SYMBOL_ALIASES: &[(&str, &str)] = &[
    ("LYX0F.DE", "UST.PA"),
    ("IE00BYX5NX33", "IE00BYX5NX33.SG"),
];

fn mapped_symbol(ticker: &str) -> &str {
    SYMBOL_ALIASES
        .iter()
        .find(|(from, _)| *from == ticker)
        .map_or(ticker, |(_, to)| *to)
}

pub struct YahooProvider {
    base_url: String,
    client: reqwest::Client,
    quote_cache: Cache<String, PriceQuote>,
    history_cache: Cache<String, Vec<ClosePoint>>,
    throttle: Throttle,
    retries: usize,
    backoff: Duration,
}

impl YahooProvider {
    pub fn new(base_url: &str) -> Self {
        YahooProvider {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
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

    async fn fetch_chart(&self, symbol: &str, range: &str) -> Result<ChartItem, FetchError> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range={}",
            self.base_url, symbol, range
        );
        debug!("Requesting chart data from {}", url);

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
            return Err(FetchError::Upstream(format!(
                "HTTP {status} for symbol {symbol}"
            )));
        }

        let data: ChartResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("chart response for {symbol}: {e}")))?;

        data.chart
            .result
            .and_then(|mut items| {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            })
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))
    }

    /// Secondary source for the same feed family: the flat quote endpoint.
    async fn fetch_quote_fallback(&self, symbol: &str) -> Result<QuoteItem, FetchError> {
        let url = format!("{}/v7/finance/quote?symbols={}", self.base_url, symbol);
        debug!("Falling back to quote endpoint {}", url);

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
            return Err(FetchError::Upstream(format!(
                "HTTP {status} for symbol {symbol}"
            )));
        }

        let data: QuoteResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(format!("quote response for {symbol}: {e}")))?;

        data.quote_response
            .result
            .and_then(|mut items| {
                if items.is_empty() {
                    None
                } else {
                    Some(items.remove(0))
                }
            })
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    #[instrument(name = "YahooQuote", skip(self), fields(ticker = %ticker))]
    async fn get_quote(&self, ticker: &str) -> Result<PriceQuote, FetchError> {
        if let Some(cached) = self.quote_cache.get(&ticker.to_string()).await {
            return Ok(cached);
        }

        self.throttle.wait().await;
        let symbol = mapped_symbol(ticker);

        let primary = with_backoff(
            || self.fetch_chart(symbol, "5d"),
            self.retries,
            self.backoff,
        )
        .await;

        let quote = match primary {
            Ok(item) => {
                let price = item.meta.regular_market_price;
                let previous_close = item.meta.previous_close.unwrap_or(price);
                let mut quote =
                    PriceQuote::from_prices(ticker, price, previous_close, &item.meta.currency);
                quote.name = item.meta.short_name;
                quote
            }
            Err(FetchError::RateLimited) => {
                warn!("Rate limit persisted for {ticker}, reporting not found");
                return Err(FetchError::NotFound(ticker.to_string()));
            }
            Err(FetchError::NotFound(_)) => {
                return Err(FetchError::NotFound(ticker.to_string()));
            }
            Err(e) => {
                warn!("Chart fetch failed for {ticker} ({e}), trying quote endpoint");
                let item = self
                    .fetch_quote_fallback(symbol)
                    .await
                    .map_err(|fallback| {
                        warn!("Quote endpoint fallback failed for {ticker}: {fallback}");
                        FetchError::NotFound(ticker.to_string())
                    })?;
                let price = item.regular_market_price;
                let previous_close = item.regular_market_previous_close.unwrap_or(price);
                let mut quote = PriceQuote::from_prices(
                    ticker,
                    price,
                    previous_close,
                    item.currency.as_deref().unwrap_or("USD"),
                );
                quote.name = item.short_name;
                quote.market_cap = item.market_cap;
                quote
            }
        };

        self.quote_cache.put(ticker.to_string(), quote.clone()).await;
        Ok(quote)
    }

    async fn get_quotes(&self, tickers: &[String]) -> HashMap<String, PriceQuote> {
        let fetches = tickers.iter().map(|ticker| async move {
            (ticker.clone(), self.get_quote(ticker).await)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(ticker, result)| match result {
                Ok(quote) => Some((ticker, quote)),
                Err(e) => {
                    debug!("Dropping {ticker} from batch: {e}");
                    None
                }
            })
            .collect()
    }

    #[instrument(name = "YahooHistory", skip(self), fields(ticker = %ticker, span = %span))]
    async fn get_history(
        &self,
        ticker: &str,
        span: HistorySpan,
    ) -> Result<Vec<ClosePoint>, FetchError> {
        let cache_key = format!("{ticker}:{span}");
        if let Some(cached) = self.history_cache.get(&cache_key).await {
            return Ok(cached);
        }

        self.throttle.wait().await;
        let symbol = mapped_symbol(ticker);

        let item = with_backoff(
            || self.fetch_chart(symbol, span.as_range()),
            self.retries,
            self.backoff,
        )
        .await
        .map_err(|e| match e {
            FetchError::NotFound(_) => FetchError::NotFound(ticker.to_string()),
            e @ (FetchError::RateLimited | FetchError::Upstream(_)) => {
                warn!("History fetch failed for {ticker} ({e}), reporting not found");
                FetchError::NotFound(ticker.to_string())
            }
            other => other,
        })?;

        let timestamps = item.timestamp.unwrap_or_default();
        let closes = item
            .indicators
            .and_then(|inds| inds.quote.into_iter().next())
            .and_then(|q| q.close)
            .unwrap_or_default();

        let history: Vec<ClosePoint> = timestamps
            .iter()
            .zip(closes)
            .filter_map(|(ts, close)| {
                let close = close?;
                let date = Utc.timestamp_opt(*ts, 0).single()?.date_naive();
                Some(ClosePoint { date, close })
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
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    currency: String,
    #[serde(alias = "chartPreviousClose")]
    previous_close: Option<f64>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<IndicatorQuote>,
}

#[derive(Deserialize, Debug)]
struct IndicatorQuote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct QuoteResponse {
    #[serde(alias = "quoteResponse")]
    quote_response: QuoteResult,
}

#[derive(Deserialize, Debug)]
struct QuoteResult {
    result: Option<Vec<QuoteItem>>,
}

#[derive(Deserialize, Debug)]
struct QuoteItem {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: f64,
    #[serde(alias = "regularMarketPreviousClose")]
    regular_market_previous_close: Option<f64>,
    currency: Option<String>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
    #[serde(alias = "marketCap")]
    market_cap: Option<f64>,
}
