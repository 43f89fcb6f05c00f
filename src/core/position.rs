//! The position ledger: current holdings persisted as a CSV file.

use crate::core::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stock,
    Etf,
    Crypto,
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetClass::Stock => "stock",
                AssetClass::Etf => "etf",
                AssetClass::Crypto => "crypto",
            }
        )
    }
}

impl FromStr for AssetClass {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" => Ok(AssetClass::Stock),
            "etf" => Ok(AssetClass::Etf),
            "crypto" => Ok(AssetClass::Crypto),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown asset class: {other}"
            ))),
        }
    }
}

/// A single holding. Only the current state is stored; position history
/// lives in the trade log, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub quantity: f64,
    pub avg_price: f64,
    #[serde(rename = "type")]
    pub asset_class: AssetClass,
    pub currency: String,
    pub broker: String,
}

impl Position {
    /// Boundary validation. Malformed records never reach the engine.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.ticker.trim().is_empty() {
            return Err(LedgerError::InvalidInput("ticker must not be empty".into()));
        }
        if self.broker.trim().is_empty() {
            return Err(LedgerError::InvalidInput("broker must not be empty".into()));
        }
        if !(self.quantity > 0.0) {
            return Err(LedgerError::InvalidInput(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if !(self.avg_price >= 0.0) {
            return Err(LedgerError::InvalidInput(format!(
                "avg_price must be non-negative, got {}",
                self.avg_price
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A buy or sell applied to the ledger. Buys merge into the weighted
/// average purchase price; sells reduce quantity and drop the position
/// once it reaches zero.
#[derive(Debug, Clone)]
pub struct Trade {
    pub side: TradeSide,
    pub ticker: String,
    pub quantity: f64,
    pub price: f64,
    pub broker: String,
}

/// CRUD over the CSV position ledger. Uniqueness of (ticker, broker) is
/// maintained by the mutation operations, not enforced by the file format.
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        PositionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads all positions; a missing ledger file is an empty portfolio.
    pub fn load(&self) -> Result<Vec<Position>, LedgerError> {
        if !self.path.exists() {
            debug!("No ledger file at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut positions = Vec::new();
        for record in reader.deserialize() {
            let position: Position = record?;
            positions.push(position);
        }
        Ok(positions)
    }

    pub fn save(&self, positions: &[Position]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        for position in positions {
            writer.serialize(position)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn add(&self, position: Position) -> Result<(), LedgerError> {
        position.validate()?;

        let mut positions = self.load()?;
        if positions
            .iter()
            .any(|p| p.ticker == position.ticker && p.broker == position.broker)
        {
            return Err(LedgerError::InvalidInput(format!(
                "position {} at {} already exists",
                position.ticker, position.broker
            )));
        }
        positions.push(position);
        self.save(&positions)
    }

    /// Updates quantity and/or average price for all rows of a ticker.
    pub fn update(
        &self,
        ticker: &str,
        quantity: Option<f64>,
        avg_price: Option<f64>,
    ) -> Result<(), LedgerError> {
        if let Some(q) = quantity {
            if !(q > 0.0) {
                return Err(LedgerError::InvalidInput(format!(
                    "quantity must be positive, got {q}"
                )));
            }
        }
        if let Some(p) = avg_price {
            if !(p >= 0.0) {
                return Err(LedgerError::InvalidInput(format!(
                    "avg_price must be non-negative, got {p}"
                )));
            }
        }

        let mut positions = self.load()?;
        let mut found = false;
        for position in positions.iter_mut() {
            if position.ticker.eq_ignore_ascii_case(ticker) {
                found = true;
                if let Some(q) = quantity {
                    position.quantity = q;
                }
                if let Some(p) = avg_price {
                    position.avg_price = p;
                }
            }
        }
        if !found {
            return Err(LedgerError::NotFound(ticker.to_string()));
        }
        self.save(&positions)
    }

    pub fn delete(&self, ticker: &str) -> Result<(), LedgerError> {
        let mut positions = self.load()?;
        let before = positions.len();
        positions.retain(|p| !p.ticker.eq_ignore_ascii_case(ticker));
        if positions.len() == before {
            return Err(LedgerError::NotFound(ticker.to_string()));
        }
        self.save(&positions)
    }

    /// Derives the ledger change from a buy/sell trade.
    pub fn apply_trade(&self, trade: &Trade) -> Result<(), LedgerError> {
        if !(trade.quantity > 0.0) {
            return Err(LedgerError::InvalidInput(format!(
                "trade quantity must be positive, got {}",
                trade.quantity
            )));
        }
        if !(trade.price >= 0.0) {
            return Err(LedgerError::InvalidInput(format!(
                "trade price must be non-negative, got {}",
                trade.price
            )));
        }

        let ticker = trade.ticker.to_uppercase();
        let mut positions = self.load()?;
        let existing = positions
            .iter_mut()
            .find(|p| p.ticker == ticker && p.broker == trade.broker);

        match trade.side {
            TradeSide::Buy => match existing {
                Some(position) => {
                    let new_quantity = position.quantity + trade.quantity;
                    position.avg_price = (position.quantity * position.avg_price
                        + trade.quantity * trade.price)
                        / new_quantity;
                    position.quantity = new_quantity;
                }
                None => positions.push(Position {
                    ticker,
                    quantity: trade.quantity,
                    avg_price: trade.price,
                    asset_class: AssetClass::Stock,
                    currency: "EUR".to_string(),
                    broker: trade.broker.clone(),
                }),
            },
            TradeSide::Sell => {
                if let Some(position) = existing {
                    position.quantity -= trade.quantity;
                    if position.quantity <= 0.0 {
                        positions.retain(|p| !(p.ticker == ticker && p.broker == trade.broker));
                    }
                } else {
                    return Err(LedgerError::NotFound(ticker));
                }
            }
        }
        self.save(&positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn position(ticker: &str, quantity: f64, avg_price: f64, broker: &str) -> Position {
        Position {
            ticker: ticker.to_string(),
            quantity,
            avg_price,
            asset_class: AssetClass::Stock,
            currency: "USD".to_string(),
            broker: broker.to_string(),
        }
    }

    fn store(dir: &tempfile::TempDir) -> PositionStore {
        PositionStore::new(dir.path().join("positions.csv"))
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        assert!(store(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store.add(position("AAPL", 10.0, 150.0, "IBKR")).unwrap();
        store.add(position("BTC", 0.5, 30000.0, "Kraken")).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ticker, "AAPL");
        assert_eq!(loaded[1].quantity, 0.5);
    }

    #[test]
    fn test_add_rejects_duplicate_ticker_broker() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store.add(position("AAPL", 10.0, 150.0, "IBKR")).unwrap();
        let err = store.add(position("AAPL", 5.0, 160.0, "IBKR")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));

        // Same ticker at a different broker is a distinct position
        store.add(position("AAPL", 5.0, 160.0, "Degiro")).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_add_rejects_invalid_records() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        assert!(store.add(position("", 10.0, 1.0, "IBKR")).is_err());
        assert!(store.add(position("AAPL", 0.0, 1.0, "IBKR")).is_err());
        assert!(store.add(position("AAPL", 1.0, -5.0, "IBKR")).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.add(position("AAPL", 10.0, 150.0, "IBKR")).unwrap();

        store.update("aapl", Some(12.0), None).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].quantity, 12.0);
        assert_eq!(loaded[0].avg_price, 150.0);

        assert!(matches!(
            store.update("MSFT", Some(1.0), None),
            Err(LedgerError::NotFound(_))
        ));

        store.delete("AAPL").unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(matches!(
            store.delete("AAPL"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_buy_merges_weighted_average() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.add(position("AAPL", 10.0, 100.0, "IBKR")).unwrap();

        store
            .apply_trade(&Trade {
                side: TradeSide::Buy,
                ticker: "AAPL".to_string(),
                quantity: 10.0,
                price: 200.0,
                broker: "IBKR".to_string(),
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].quantity, 20.0);
        assert_eq!(loaded[0].avg_price, 150.0);
    }

    #[test]
    fn test_buy_creates_missing_position() {
        let dir = tempdir().unwrap();
        let store = store(&dir);

        store
            .apply_trade(&Trade {
                side: TradeSide::Buy,
                ticker: "msft".to_string(),
                quantity: 3.0,
                price: 300.0,
                broker: "IBKR".to_string(),
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded[0].ticker, "MSFT");
        assert_eq!(loaded[0].avg_price, 300.0);
    }

    #[test]
    fn test_sell_reduces_then_removes() {
        let dir = tempdir().unwrap();
        let store = store(&dir);
        store.add(position("AAPL", 10.0, 100.0, "IBKR")).unwrap();

        let sell = |quantity| Trade {
            side: TradeSide::Sell,
            ticker: "AAPL".to_string(),
            quantity,
            price: 120.0,
            broker: "IBKR".to_string(),
        };

        store.apply_trade(&sell(4.0)).unwrap();
        assert_eq!(store.load().unwrap()[0].quantity, 6.0);

        store.apply_trade(&sell(6.0)).unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
