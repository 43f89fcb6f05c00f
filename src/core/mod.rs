//! Core domain logic: data model, stores, conversion and analytics.

pub mod cache;
pub mod config;
pub mod error;
pub mod fx;
pub mod history;
pub mod kpi;
pub mod log;
pub mod position;
pub mod quote;
pub mod valuation;

// Re-export main types for cleaner imports
pub use error::{FetchError, LedgerError};
pub use fx::{CurrencyConverter, FxRateTable, RateSource};
pub use history::{HistoryPoint, HistoryStore};
pub use kpi::KpiSet;
pub use position::{AssetClass, Position, PositionStore, Trade, TradeSide};
pub use quote::{ClosePoint, HistorySpan, PriceQuote, QuoteProvider};
pub use valuation::{Allocation, PortfolioSnapshot, PricedPosition};
