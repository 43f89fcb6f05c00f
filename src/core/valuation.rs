//! Merges positions, live quotes and FX rates into a priced portfolio.

use crate::core::fx::CurrencyConverter;
use crate::core::history::HistoryPoint;
use crate::core::kpi::KpiSet;
use crate::core::position::{AssetClass, Position};
use crate::core::quote::PriceQuote;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A position joined with its quote and FX rate. Derived per request,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct PricedPosition {
    pub ticker: String,
    pub name: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: f64,
    pub cost_basis: f64,
    pub market_value: f64,
    pub market_value_base: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
    pub day_change: f64,
    pub day_change_base: f64,
    pub day_change_pct: f64,
    pub asset_class: AssetClass,
    pub currency: String,
    pub broker: String,
    pub weight: f64,
}

/// One bucket of the by-type / by-broker / by-currency breakdowns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Allocation {
    pub value: f64,
    pub cost: f64,
    pub gain_loss: f64,
    pub gain_loss_pct: f64,
    pub weight: f64,
    pub count: usize,
}

/// The complete valuation result, recomputed on every request.
#[derive(Debug, Serialize)]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain_loss: f64,
    pub total_gain_loss_pct: f64,
    pub daily_change: f64,
    pub daily_change_pct: f64,
    pub base_currency: String,
    pub positions: Vec<PricedPosition>,
    pub by_type: BTreeMap<String, Allocation>,
    pub by_broker: BTreeMap<String, Allocation>,
    pub by_currency: BTreeMap<String, Allocation>,
    pub kpis: KpiSet,
    pub last_updated: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn empty(base_currency: &str) -> Self {
        PortfolioSnapshot {
            total_value: 0.0,
            total_cost: 0.0,
            total_gain_loss: 0.0,
            total_gain_loss_pct: 0.0,
            daily_change: 0.0,
            daily_change_pct: 0.0,
            base_currency: base_currency.to_string(),
            positions: Vec::new(),
            by_type: BTreeMap::new(),
            by_broker: BTreeMap::new(),
            by_currency: BTreeMap::new(),
            kpis: KpiSet::default(),
            last_updated: Utc::now(),
        }
    }

    /// Merges the KPI series result computed over the value history.
    pub fn with_kpis(mut self, history: &[HistoryPoint]) -> Self {
        self.kpis = crate::core::kpi::compute(history);
        self
    }
}

/// Prices every position against the pre-fetched quote map, converts to
/// the base currency, computes weights and the three allocation
/// breakdowns, and sorts positions by converted market value.
///
/// A ticker missing from `quotes` is valued at its average purchase price
/// for both current and previous close, so its gain and day change read
/// as zero instead of being fabricated.
pub async fn value_positions(
    positions: &[Position],
    quotes: &HashMap<String, PriceQuote>,
    converter: &CurrencyConverter,
) -> PortfolioSnapshot {
    let mut snapshot = PortfolioSnapshot::empty(converter.base());
    let mut priced = Vec::with_capacity(positions.len());
    let mut cost_base_by_position = Vec::with_capacity(positions.len());

    for position in positions {
        let quote = quotes.get(&position.ticker);
        // The position's currency is authoritative for conversion.
        let (current_price, previous_close) = match quote {
            Some(q) => (q.price, q.previous_close),
            None => {
                debug!(
                    "No quote for {}, valuing at average purchase price",
                    position.ticker
                );
                (position.avg_price, position.avg_price)
            }
        };

        let cost_basis = position.quantity * position.avg_price;
        let market_value = position.quantity * current_price;
        let gain_loss = market_value - cost_basis;
        let gain_loss_pct = if cost_basis > 0.0 {
            gain_loss / cost_basis * 100.0
        } else {
            0.0
        };

        let day_change = (current_price - previous_close) * position.quantity;
        let day_change_pct = if previous_close > 0.0 {
            (current_price - previous_close) / previous_close * 100.0
        } else {
            0.0
        };

        let market_value_base = converter.to_base(market_value, &position.currency).await;
        let cost_basis_base = converter.to_base(cost_basis, &position.currency).await;
        let day_change_base = converter.to_base(day_change, &position.currency).await;

        snapshot.total_value += market_value_base;
        snapshot.total_cost += cost_basis_base;
        snapshot.daily_change += day_change_base;
        cost_base_by_position.push(cost_basis_base);

        priced.push(PricedPosition {
            ticker: position.ticker.clone(),
            name: quote
                .and_then(|q| q.name.clone())
                .unwrap_or_else(|| position.ticker.clone()),
            quantity: position.quantity,
            avg_price: position.avg_price,
            current_price,
            cost_basis,
            market_value,
            market_value_base,
            gain_loss,
            gain_loss_pct: round2(gain_loss_pct),
            day_change,
            day_change_base,
            day_change_pct: round2(day_change_pct),
            asset_class: position.asset_class,
            currency: position.currency.clone(),
            broker: position.broker.clone(),
            weight: 0.0,
        });
    }

    let total_value = snapshot.total_value;
    for position in priced.iter_mut() {
        position.weight = if total_value > 0.0 {
            round2(position.market_value_base / total_value * 100.0)
        } else {
            0.0
        };
    }

    for (position, cost_base) in priced.iter().zip(&cost_base_by_position) {
        for (key, buckets) in [
            (position.asset_class.to_string(), &mut snapshot.by_type),
            (position.broker.clone(), &mut snapshot.by_broker),
            (position.currency.clone(), &mut snapshot.by_currency),
        ] {
            let bucket = buckets.entry(key).or_default();
            bucket.value += position.market_value_base;
            bucket.cost += cost_base;
            bucket.count += 1;
        }
    }
    for buckets in [
        &mut snapshot.by_type,
        &mut snapshot.by_broker,
        &mut snapshot.by_currency,
    ] {
        for bucket in buckets.values_mut() {
            bucket.gain_loss = bucket.value - bucket.cost;
            bucket.gain_loss_pct = if bucket.cost > 0.0 {
                round2(bucket.gain_loss / bucket.cost * 100.0)
            } else {
                0.0
            };
            bucket.weight = if total_value > 0.0 {
                round2(bucket.value / total_value * 100.0)
            } else {
                0.0
            };
        }
    }

    // Largest holdings first; equal values keep their ledger order.
    priced.sort_by(|a, b| {
        b.market_value_base
            .partial_cmp(&a.market_value_base)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    snapshot.positions = priced;

    snapshot.total_gain_loss = snapshot.total_value - snapshot.total_cost;
    snapshot.total_gain_loss_pct = if snapshot.total_cost > 0.0 {
        round2(snapshot.total_gain_loss / snapshot.total_cost * 100.0)
    } else {
        0.0
    };
    let previous_value = snapshot.total_value - snapshot.daily_change;
    snapshot.daily_change_pct = if previous_value > 0.0 {
        round2(snapshot.daily_change / previous_value * 100.0)
    } else {
        0.0
    };

    snapshot
}
