//! Currency conversion against a configured base currency.

use crate::core::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RATE_TABLE_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Exchange rates relative to a base currency. The base always maps to 1.0.
/// Tables are replaced wholesale on refresh, never partially mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxRateTable {
    pub base: String,
    pub rates: HashMap<String, f64>,
}

impl FxRateTable {
    pub fn new(base: &str, mut rates: HashMap<String, f64>) -> Self {
        let base = base.to_uppercase();
        rates.insert(base.clone(), 1.0);
        FxRateTable { base, rates }
    }

    /// Rate for `code` relative to the base; 1.0 for unknown codes so a
    /// missing rate degrades to an unconverted amount instead of failing.
    pub fn rate(&self, code: &str) -> f64 {
        self.rates.get(&code.to_uppercase()).copied().unwrap_or(1.0)
    }

    /// Static fallback used when the rate feed is unreachable. Expressed
    /// relative to EUR and renormalized to the requested base.
    pub fn fallback(base: &str) -> Self {
        let eur_rates = [
            ("EUR", 1.0),
            ("USD", 1.08),
            ("GBP", 0.86),
            ("CHF", 0.95),
            ("JPY", 162.0),
        ];
        let base = base.to_uppercase();
        let base_rate = eur_rates
            .iter()
            .find(|(c, _)| *c == base)
            .map_or(1.0, |(_, r)| *r);
        let rates = eur_rates
            .iter()
            .map(|(c, r)| (c.to_string(), r / base_rate))
            .collect();
        FxRateTable::new(&base, rates)
    }
}

/// A feed that produces a full rate table for a base currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, base: &str) -> Result<FxRateTable, FetchError>;
}

/// Converts amounts between currencies through the base currency.
///
/// The rate table is fetched lazily, cached for a few hours, and replaced
/// by the static fallback on fetch failure, so conversion never fails.
pub struct CurrencyConverter {
    source: Arc<dyn RateSource>,
    base: String,
    table: Mutex<Option<(FxRateTable, Instant)>>,
}

impl CurrencyConverter {
    pub fn new(source: Arc<dyn RateSource>, base: &str) -> Self {
        CurrencyConverter {
            source,
            base: base.to_uppercase(),
            table: Mutex::new(None),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Current rate table, fetched or refreshed as needed.
    pub async fn rates(&self) -> FxRateTable {
        let mut cached = self.table.lock().await;
        if let Some((table, fetched_at)) = cached.as_ref() {
            if fetched_at.elapsed() < RATE_TABLE_TTL {
                debug!("Using cached FX rate table");
                return table.clone();
            }
        }

        let table = match self.source.fetch_rates(&self.base).await {
            Ok(table) => table,
            Err(e) => {
                warn!("FX rate fetch failed, using static fallback: {e}");
                FxRateTable::fallback(&self.base)
            }
        };
        *cached = Some((table.clone(), Instant::now()));
        table
    }

    /// Converts `amount` from one currency to another. Cross-rates compose
    /// through the base currency. A no-op when `from == to`.
    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return amount;
        }

        let table = self.rates().await;
        amount / table.rate(&from) * table.rate(&to)
    }

    /// Converts `amount` into the base currency.
    pub async fn to_base(&self, amount: f64, from: &str) -> f64 {
        self.convert(amount, from, &self.base).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource {
        rates: HashMap<String, f64>,
    }

    #[async_trait]
    impl RateSource for StaticSource {
        async fn fetch_rates(&self, base: &str) -> Result<FxRateTable, FetchError> {
            Ok(FxRateTable::new(base, self.rates.clone()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RateSource for FailingSource {
        async fn fetch_rates(&self, _base: &str) -> Result<FxRateTable, FetchError> {
            Err(FetchError::Upstream("connection refused".into()))
        }
    }

    fn converter() -> CurrencyConverter {
        let rates = HashMap::from([
            ("USD".to_string(), 1.08),
            ("GBP".to_string(), 0.86),
            ("CHF".to_string(), 0.95),
        ]);
        CurrencyConverter::new(Arc::new(StaticSource { rates }), "EUR")
    }

    #[tokio::test]
    async fn test_convert_same_currency_is_identity() {
        let fx = converter();
        assert_eq!(fx.convert(42.0, "USD", "USD").await, 42.0);
        // Holds even for codes absent from the table
        assert_eq!(fx.convert(42.0, "AUD", "AUD").await, 42.0);
    }

    #[tokio::test]
    async fn test_convert_to_base() {
        let fx = converter();
        let eur = fx.to_base(108.0, "USD").await;
        assert!((eur - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_convert_from_base() {
        let fx = converter();
        let usd = fx.convert(100.0, "EUR", "USD").await;
        assert!((usd - 108.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cross_rate_through_base() {
        let fx = converter();
        // USD -> GBP composes through EUR: 108 USD = 100 EUR = 86 GBP
        let gbp = fx.convert(108.0, "USD", "GBP").await;
        assert!((gbp - 86.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cross_conversion_round_trips() {
        let fx = converter();
        let there = fx.convert(250.0, "USD", "CHF").await;
        let back = fx.convert(there, "CHF", "USD").await;
        assert!((back - 250.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_currency_degrades_to_unit_rate() {
        let fx = converter();
        assert_eq!(fx.convert(10.0, "XYZ", "EUR").await, 10.0);
    }

    #[tokio::test]
    async fn test_fallback_table_on_fetch_failure() {
        let fx = CurrencyConverter::new(Arc::new(FailingSource), "EUR");
        let table = fx.rates().await;
        assert_eq!(table.rate("EUR"), 1.0);
        assert_eq!(table.rate("USD"), 1.08);
        // Conversion still works off the fallback table
        let eur = fx.to_base(108.0, "USD").await;
        assert!((eur - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_renormalizes_to_base() {
        let table = FxRateTable::fallback("USD");
        assert_eq!(table.rate("USD"), 1.0);
        assert!((table.rate("EUR") - 1.0 / 1.08).abs() < 1e-9);
    }
}
