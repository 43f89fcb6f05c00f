//! Risk and performance KPIs computed from the daily value series.

use crate::core::history::HistoryPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const ANNUAL_RISK_FREE_RATE: f64 = 0.03;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiSet {
    /// Compound annual growth rate, percent.
    pub cagr: f64,
    /// Largest peak-to-trough decline, percent.
    pub max_drawdown: f64,
    /// Date the maximum drawdown was recorded; None when the series never
    /// declined from a peak.
    pub max_drawdown_date: Option<NaiveDate>,
    /// Best single-day simple return, percent.
    pub best_day: f64,
    /// Worst single-day simple return, percent.
    pub worst_day: f64,
    /// Annualized volatility of daily returns, percent.
    pub volatility: f64,
    /// Annualized Sharpe ratio against a 3% risk-free rate.
    pub sharpe_ratio: f64,
    pub days_tracked: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

// Population standard deviation (divide by N), the convention used for
// both volatility and the Sharpe denominator.
fn stdev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Computes all KPIs over the value series, assumed sorted ascending by
/// date. Consecutive points are treated as adjacent trading days even
/// across calendar gaps; no interpolation. With fewer than two points
/// every KPI is zero and only `days_tracked` is meaningful.
pub fn compute(history: &[HistoryPoint]) -> KpiSet {
    let mut kpis = KpiSet {
        days_tracked: history.len(),
        ..KpiSet::default()
    };

    if history.len() < 2 {
        return kpis;
    }

    let returns: Vec<f64> = history
        .windows(2)
        .map(|w| (w[1].value - w[0].value) / w[0].value)
        .collect();

    kpis.best_day = round2(returns.iter().cloned().fold(f64::MIN, f64::max) * 100.0);
    kpis.worst_day = round2(returns.iter().cloned().fold(f64::MAX, f64::min) * 100.0);
    kpis.volatility = round2(stdev(&returns) * TRADING_DAYS_PER_YEAR.sqrt() * 100.0);

    let risk_free = ANNUAL_RISK_FREE_RATE / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free).collect();
    let excess_stdev = stdev(&excess);
    if excess_stdev > 0.0 {
        kpis.sharpe_ratio =
            round2(mean(&excess) / excess_stdev * TRADING_DAYS_PER_YEAR.sqrt());
    }

    let first = &history[0];
    let last = &history[history.len() - 1];
    let years = (last.date - first.date).num_days() as f64 / 365.25;
    if years > 0.0 && first.value > 0.0 {
        kpis.cagr = round2(((last.value / first.value).powf(1.0 / years) - 1.0) * 100.0);
    }

    // Running-peak drawdown; ties keep the first occurrence.
    let mut peak = first.value;
    let mut max_drawdown = 0.0;
    let mut max_drawdown_date = None;
    for point in history {
        if point.value > peak {
            peak = point.value;
        }
        let drawdown = (peak - point.value) / peak;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
            max_drawdown_date = Some(point.date);
        }
    }
    kpis.max_drawdown = round2(max_drawdown * 100.0);
    kpis.max_drawdown_date = max_drawdown_date;

    kpis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: &[(&str, f64)]) -> Vec<HistoryPoint> {
        points
            .iter()
            .map(|(d, v)| HistoryPoint {
                date: d.parse().unwrap(),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn test_fewer_than_two_points_is_all_zero() {
        let empty = compute(&[]);
        assert_eq!(empty, KpiSet::default());

        let single = compute(&series(&[("2024-01-01", 100.0)]));
        assert_eq!(single.days_tracked, 1);
        assert_eq!(single.cagr, 0.0);
        assert_eq!(single.volatility, 0.0);
        assert_eq!(single.sharpe_ratio, 0.0);
        assert!(single.max_drawdown_date.is_none());
    }

    #[test]
    fn test_best_and_worst_day() {
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 110.0),
            ("2024-01-03", 99.0),
        ]));
        assert_eq!(kpis.best_day, 10.0);
        assert_eq!(kpis.worst_day, -10.0);
        assert_eq!(kpis.days_tracked, 3);
    }

    #[test]
    fn test_cagr_over_one_year() {
        let kpis = compute(&series(&[("2020-01-01", 100.0), ("2021-01-01", 121.0)]));
        assert!((kpis.cagr - 21.0).abs() < 0.1);
    }

    #[test]
    fn test_cagr_zero_when_first_value_not_positive() {
        let kpis = compute(&series(&[("2020-01-01", 0.0), ("2021-01-01", 121.0)]));
        assert_eq!(kpis.cagr, 0.0);
    }

    #[test]
    fn test_strictly_increasing_series_has_no_drawdown() {
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 105.0),
            ("2024-01-03", 112.0),
            ("2024-01-04", 120.0),
        ]));
        assert_eq!(kpis.max_drawdown, 0.0);
        assert!(kpis.max_drawdown_date.is_none());
    }

    #[test]
    fn test_max_drawdown_tracks_running_peak() {
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 120.0),
            ("2024-01-03", 90.0),
            ("2024-01-04", 130.0),
            ("2024-01-05", 117.0),
        ]));
        // Deepest decline: 120 -> 90 = 25%
        assert_eq!(kpis.max_drawdown, 25.0);
        assert_eq!(
            kpis.max_drawdown_date,
            Some("2024-01-03".parse().unwrap())
        );
    }

    #[test]
    fn test_drawdown_tie_keeps_first_occurrence() {
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 90.0),
            ("2024-01-03", 100.0),
            ("2024-01-04", 90.0),
        ]));
        assert_eq!(kpis.max_drawdown, 10.0);
        assert_eq!(
            kpis.max_drawdown_date,
            Some("2024-01-02".parse().unwrap())
        );
    }

    // Volatility uses the population standard deviation (divide by N),
    // annualized by sqrt(252).
    #[test]
    fn test_volatility_population_stdev() {
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 110.0),
            ("2024-01-03", 99.0),
        ]));
        // Returns are +10% and -10%: population stdev = 0.10
        let expected = (0.10f64 * 252f64.sqrt() * 100.0 * 100.0).round() / 100.0;
        assert_eq!(kpis.volatility, expected);
    }

    #[test]
    fn test_sharpe_zero_when_returns_are_constant() {
        // Constant relative change gives zero stdev of excess returns
        let kpis = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 100.0),
            ("2024-01-03", 100.0),
        ]));
        assert_eq!(kpis.sharpe_ratio, 0.0);
    }

    #[test]
    fn test_sharpe_sign_follows_excess_returns() {
        let up = compute(&series(&[
            ("2024-01-01", 100.0),
            ("2024-01-02", 102.0),
            ("2024-01-03", 105.0),
        ]));
        assert!(up.sharpe_ratio > 0.0);

        let down = compute(&series(&[
            ("2024-01-01", 105.0),
            ("2024-01-02", 102.0),
            ("2024-01-03", 100.0),
        ]));
        assert!(down.sharpe_ratio < 0.0);
    }
}
