//! Append-only daily history of total portfolio value.

use crate::core::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One recorded portfolio value. At most one point exists per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// The on-disk shape: values sorted ascending by date.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValueHistory {
    pub values: Vec<HistoryPoint>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Flat-file store for the value series. The file is read and rewritten
/// wholesale on each append; there is a single logical writer.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        HistoryStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<ValueHistory, LedgerError> {
        if !self.path.exists() {
            debug!("No history file at {}, starting empty", self.path.display());
            return Ok(ValueHistory::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Records `value` for `date`. Idempotent per date: a recomputation on
    /// the same day overwrites the existing point in place, so the series
    /// never grows past one point per day and stays sorted.
    pub fn record(&self, date: NaiveDate, value: f64) -> Result<(), LedgerError> {
        let mut history = self.load()?;

        match history.values.iter_mut().find(|p| p.date == date) {
            Some(existing) => existing.value = value,
            None => {
                history.values.push(HistoryPoint { date, value });
                history.values.sort_by_key(|p| p.date);
            }
        }
        history.last_updated = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&history)?)?;
        Ok(())
    }

    /// The points from the last `days` calendar days, oldest first.
    pub fn recent(&self, days: u32) -> Result<Vec<HistoryPoint>, LedgerError> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(i64::from(days));
        let history = self.load()?;
        Ok(history
            .values
            .into_iter()
            .filter(|p| p.date >= cutoff)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        let history = store.load().unwrap();
        assert!(history.values.is_empty());
        assert!(history.last_updated.is_none());
    }

    #[test]
    fn test_record_keeps_series_sorted() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        store.record(date("2024-03-02"), 110.0).unwrap();
        store.record(date("2024-03-01"), 100.0).unwrap();
        store.record(date("2024-03-03"), 120.0).unwrap();

        let history = store.load().unwrap();
        let dates: Vec<_> = history.values.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![date("2024-03-01"), date("2024-03-02"), date("2024-03-03")]
        );
        assert!(history.last_updated.is_some());
    }

    #[test]
    fn test_same_day_record_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        store.record(date("2024-03-01"), 100.0).unwrap();
        store.record(date("2024-03-02"), 110.0).unwrap();
        store.record(date("2024-03-02"), 115.5).unwrap();

        let history = store.load().unwrap();
        assert_eq!(history.values.len(), 2);
        assert_eq!(history.values[1].value, 115.5);
    }

    #[test]
    fn test_recent_filters_by_cutoff() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));

        let today = Utc::now().date_naive();
        store.record(today - chrono::Duration::days(400), 90.0).unwrap();
        store.record(today - chrono::Duration::days(10), 100.0).unwrap();
        store.record(today, 110.0).unwrap();

        let recent = store.recent(30).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].value, 100.0);
    }

    #[test]
    fn test_file_layout_matches_wire_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let store = HistoryStore::new(&path);
        store.record(date("2024-03-01"), 1234.5).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["values"][0]["date"], "2024-03-01");
        assert_eq!(raw["values"][0]["value"], 1234.5);
        assert!(raw["last_updated"].is_string());
    }
}
