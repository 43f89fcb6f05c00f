//! Price quote abstractions and core types

use crate::core::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

/// A live market quote for a single ticker.
///
/// Quotes are ephemeral: produced fresh on every fetch and cached only
/// inside the adapter that produced them, with a per-family TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: String,
    pub price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub currency: String,
    pub name: Option<String>,
    pub market_cap: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl PriceQuote {
    /// Builds a quote from raw prices, deriving the change fields.
    /// Change percent is 0 when there is no usable previous close.
    pub fn from_prices(ticker: &str, price: f64, previous_close: f64, currency: &str) -> Self {
        let change = price - previous_close;
        let change_percent = if previous_close > 0.0 {
            change / previous_close * 100.0
        } else {
            0.0
        };
        PriceQuote {
            ticker: ticker.to_string(),
            price,
            previous_close,
            change,
            change_percent,
            currency: currency.to_string(),
            name: None,
            market_cap: None,
            last_updated: Utc::now(),
        }
    }
}

/// One daily closing price in an asset's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Requested length of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistorySpan {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    FiveYears,
    Max,
}

impl HistorySpan {
    /// Range parameter understood by the equity feed's chart endpoint.
    pub fn as_range(&self) -> &'static str {
        match self {
            HistorySpan::OneMonth => "1mo",
            HistorySpan::ThreeMonths => "3mo",
            HistorySpan::SixMonths => "6mo",
            HistorySpan::OneYear => "1y",
            HistorySpan::FiveYears => "5y",
            HistorySpan::Max => "max",
        }
    }

    /// Day count understood by the crypto feed's market chart endpoint.
    pub fn days(&self) -> u32 {
        match self {
            HistorySpan::OneMonth => 30,
            HistorySpan::ThreeMonths => 90,
            HistorySpan::SixMonths => 180,
            HistorySpan::OneYear => 365,
            HistorySpan::FiveYears => 365 * 5,
            HistorySpan::Max => 365 * 10,
        }
    }
}

impl Display for HistorySpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistorySpan::OneMonth => "1m",
                HistorySpan::ThreeMonths => "3m",
                HistorySpan::SixMonths => "6m",
                HistorySpan::OneYear => "1y",
                HistorySpan::FiveYears => "5y",
                HistorySpan::Max => "max",
            }
        )
    }
}

impl FromStr for HistorySpan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(HistorySpan::OneMonth),
            "3m" => Ok(HistorySpan::ThreeMonths),
            "6m" => Ok(HistorySpan::SixMonths),
            "1y" => Ok(HistorySpan::OneYear),
            "5y" => Ok(HistorySpan::FiveYears),
            "max" => Ok(HistorySpan::Max),
            _ => Err(anyhow::anyhow!("Invalid history span: {}", s)),
        }
    }
}

/// Uniform interface to a market-data feed for one asset-class family.
///
/// `get_quotes` is best-effort: tickers missing from the returned map
/// failed to resolve, which is not the same as a zero price.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(&self, ticker: &str) -> Result<PriceQuote, FetchError>;

    async fn get_quotes(&self, tickers: &[String]) -> HashMap<String, PriceQuote>;

    async fn get_history(
        &self,
        ticker: &str,
        span: HistorySpan,
    ) -> Result<Vec<ClosePoint>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_from_prices_derives_change() {
        let quote = PriceQuote::from_prices("AAPL", 110.0, 100.0, "USD");
        assert_eq!(quote.change, 10.0);
        assert_eq!(quote.change_percent, 10.0);
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn test_quote_from_prices_zero_previous_close() {
        let quote = PriceQuote::from_prices("NEW", 50.0, 0.0, "USD");
        assert_eq!(quote.change, 50.0);
        assert_eq!(quote.change_percent, 0.0);
    }

    #[test]
    fn test_history_span_round_trip() {
        for s in ["1m", "3m", "6m", "1y", "5y", "max"] {
            let span: HistorySpan = s.parse().unwrap();
            assert_eq!(span.to_string(), s);
        }
        assert!("2w".parse::<HistorySpan>().is_err());
    }
}
