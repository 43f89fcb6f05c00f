//! Wires stores, feed adapters and the converter into the public
//! portfolio operations.

use crate::core::config::AppConfig;
use crate::core::error::FetchError;
use crate::core::fx::CurrencyConverter;
use crate::core::history::{HistoryPoint, HistoryStore};
use crate::core::kpi::{self, KpiSet};
use crate::core::position::{AssetClass, PositionStore};
use crate::core::quote::{ClosePoint, HistorySpan, QuoteProvider};
use crate::core::valuation::{self, PortfolioSnapshot};
use crate::providers::{CoinGeckoProvider, ExchangeRateApiSource, YahooProvider};
use anyhow::Result;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_EQUITY_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_CRYPTO_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_FX_URL: &str = "https://api.exchangerate-api.com";

/// Crypto quotes are requested in this currency; conversion to the
/// portfolio base happens in the valuation step off the position's own
/// currency field.
const CRYPTO_VS_CURRENCY: &str = "usd";

pub struct PortfolioService {
    config: AppConfig,
    equity: Arc<dyn QuoteProvider>,
    crypto: Arc<dyn QuoteProvider>,
    converter: CurrencyConverter,
    positions: PositionStore,
    history: HistoryStore,
}

fn base_url<'a>(feed: &'a Option<crate::core::config::FeedConfig>, default: &'a str) -> &'a str {
    feed.as_ref().map_or(default, |f| f.base_url.as_str())
}

impl PortfolioService {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let equity: Arc<dyn QuoteProvider> = Arc::new(YahooProvider::new(base_url(
            &config.providers.equity,
            DEFAULT_EQUITY_URL,
        )));
        let crypto: Arc<dyn QuoteProvider> = Arc::new(CoinGeckoProvider::new(
            base_url(&config.providers.crypto, DEFAULT_CRYPTO_URL),
            CRYPTO_VS_CURRENCY,
        ));
        let converter = CurrencyConverter::new(
            Arc::new(ExchangeRateApiSource::new(base_url(
                &config.providers.fx,
                DEFAULT_FX_URL,
            ))),
            &config.base_currency,
        );
        let positions = PositionStore::new(config.positions_path()?);
        let history = HistoryStore::new(config.history_path()?);

        Ok(PortfolioService {
            config,
            equity,
            crypto,
            converter,
            positions,
            history,
        })
    }

    pub fn position_store(&self) -> &PositionStore {
        &self.positions
    }

    /// Discards all adapter state (caches, throttles, the FX table) by
    /// rebuilding the service from its config.
    pub fn refresh(&mut self) -> Result<()> {
        info!("Refreshing feed adapters");
        *self = Self::from_config(self.config.clone())?;
        Ok(())
    }

    /// Values the whole portfolio: one batched quote call per asset
    /// class represented, joined concurrently, then aggregation, the
    /// daily history append and the KPI merge.
    pub async fn value_portfolio(&self) -> Result<PortfolioSnapshot> {
        let positions = self.positions.load()?;
        if positions.is_empty() {
            debug!("Ledger is empty, returning empty snapshot");
            return Ok(PortfolioSnapshot::empty(self.converter.base()));
        }

        let mut equity_tickers = Vec::new();
        let mut crypto_tickers = Vec::new();
        let mut seen = HashSet::new();
        for position in &positions {
            if !seen.insert(position.ticker.clone()) {
                continue;
            }
            match position.asset_class {
                AssetClass::Stock | AssetClass::Etf => equity_tickers.push(position.ticker.clone()),
                AssetClass::Crypto => crypto_tickers.push(position.ticker.clone()),
            }
        }

        let (equity_quotes, crypto_quotes) = tokio::join!(
            async {
                if equity_tickers.is_empty() {
                    HashMap::new()
                } else {
                    self.equity.get_quotes(&equity_tickers).await
                }
            },
            async {
                if crypto_tickers.is_empty() {
                    HashMap::new()
                } else {
                    self.crypto.get_quotes(&crypto_tickers).await
                }
            },
        );

        let mut quotes = equity_quotes;
        quotes.extend(crypto_quotes);
        debug!(
            "Resolved {} of {} tickers",
            quotes.len(),
            equity_tickers.len() + crypto_tickers.len()
        );

        let snapshot = valuation::value_positions(&positions, &quotes, &self.converter).await;

        self.history
            .record(Utc::now().date_naive(), snapshot.total_value)?;
        let history = self.history.load()?;
        Ok(snapshot.with_kpis(&history.values))
    }

    /// Portfolio value points from the last `days` days.
    pub fn get_history(&self, days: u32) -> Result<Vec<HistoryPoint>> {
        Ok(self.history.recent(days)?)
    }

    /// KPIs over the full recorded value series.
    pub fn get_kpis(&self) -> Result<KpiSet> {
        let history = self.history.load()?;
        Ok(kpi::compute(&history.values))
    }

    /// Daily close series for a single asset from the feed matching its
    /// asset class.
    pub async fn get_asset_history(
        &self,
        ticker: &str,
        asset_class: AssetClass,
        span: HistorySpan,
    ) -> Result<Vec<ClosePoint>, FetchError> {
        match asset_class {
            AssetClass::Crypto => self.crypto.get_history(ticker, span).await,
            AssetClass::Stock | AssetClass::Etf => self.equity.get_history(ticker, span).await,
        }
    }
}
