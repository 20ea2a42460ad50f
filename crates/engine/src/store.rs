//! Append-only price store with timestamp deduplication
//!
//! The store never synthesizes points. Callers that find the series too
//! short get [`EngineError::InsufficientData`] and must wait for real
//! observations to arrive.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use crate::types::{PricePoint, PriceSource};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("duplicate timestamp {timestamp}: a point with this timestamp is already stored")]
    DuplicateTimestamp { timestamp: i64 },

    #[error("insufficient real observations: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("rejected non-positive price at timestamp {timestamp}")]
    NonPositiveValue { timestamp: i64 },
}

/// Ordered, deduplicated time series of observed prices.
///
/// Exactly one writer mutates this (the orchestrator), so no interior
/// locking. Ordering is re-validated on every append rather than trusted
/// from upstream: the map is keyed by timestamp.
#[derive(Debug, Default)]
pub struct PriceStore {
    points: BTreeMap<i64, PricePoint>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    /// Insert a point in timestamp order.
    ///
    /// A second point with an identical timestamp is rejected with
    /// [`EngineError::DuplicateTimestamp`] and the stored point is kept
    /// untouched (idempotent re-delivery protection).
    pub fn append(&mut self, point: PricePoint) -> Result<(), EngineError> {
        if point.value <= Decimal::ZERO {
            return Err(EngineError::NonPositiveValue {
                timestamp: point.timestamp,
            });
        }
        if self.points.contains_key(&point.timestamp) {
            return Err(EngineError::DuplicateTimestamp {
                timestamp: point.timestamp,
            });
        }
        debug!(
            timestamp = point.timestamp,
            value = %point.value,
            source = point.source.as_str(),
            "Price point appended"
        );
        self.points.insert(point.timestamp, point);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_minimum(&self, n: usize) -> bool {
        self.points.len() >= n
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.values().next_back()
    }

    /// Ordered iterator over the series, optionally starting at `since`
    /// (inclusive).
    pub fn series(&self, since: Option<i64>) -> impl Iterator<Item = &PricePoint> {
        let start = since.unwrap_or(i64::MIN);
        self.points.range(start..).map(|(_, p)| p)
    }

    /// The purchased-only slice of the series, materialized for replay.
    pub fn purchased_series(&self) -> Vec<PricePoint> {
        self.points
            .values()
            .filter(|p| p.source == PriceSource::Purchased)
            .cloned()
            .collect()
    }

    /// Error-or-nothing gate used before strategy synthesis.
    pub fn require_minimum(&self, need: usize) -> Result<(), EngineError> {
        let have = self.points.len();
        if have < need {
            return Err(EngineError::InsufficientData { have, need });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(ts: i64, value: Decimal) -> PricePoint {
        PricePoint {
            timestamp: ts,
            value,
            source: PriceSource::Purchased,
        }
    }

    #[test]
    fn append_keeps_timestamp_order() {
        let mut store = PriceStore::new();
        store.append(point(300, dec!(10))).unwrap();
        store.append(point(100, dec!(11))).unwrap();
        store.append(point(200, dec!(12))).unwrap();

        let timestamps: Vec<i64> = store.series(None).map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn duplicate_timestamp_rejected_and_original_kept() {
        let mut store = PriceStore::new();
        store.append(point(1000, dec!(50))).unwrap();

        let err = store.append(point(1000, dec!(99))).unwrap_err();
        assert_eq!(err, EngineError::DuplicateTimestamp { timestamp: 1000 });
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().unwrap().value, dec!(50));
    }

    #[test]
    fn non_positive_value_rejected() {
        let mut store = PriceStore::new();
        let err = store.append(point(1, dec!(0))).unwrap_err();
        assert_eq!(err, EngineError::NonPositiveValue { timestamp: 1 });
        assert!(store.is_empty());
    }

    #[test]
    fn series_since_is_inclusive() {
        let mut store = PriceStore::new();
        for ts in [10, 20, 30, 40] {
            store.append(point(ts, dec!(1))).unwrap();
        }
        let tail: Vec<i64> = store.series(Some(20)).map(|p| p.timestamp).collect();
        assert_eq!(tail, vec![20, 30, 40]);
    }

    #[test]
    fn purchased_series_filters_replay_points() {
        let mut store = PriceStore::new();
        store.append(point(1, dec!(5))).unwrap();
        store
            .append(PricePoint {
                timestamp: 2,
                value: dec!(6),
                source: PriceSource::Replay,
            })
            .unwrap();

        let purchased = store.purchased_series();
        assert_eq!(purchased.len(), 1);
        assert_eq!(purchased[0].timestamp, 1);
    }

    #[test]
    fn require_minimum_reports_counts() {
        let mut store = PriceStore::new();
        for ts in 0..7 {
            store.append(point(ts, dec!(1))).unwrap();
        }
        assert!(!store.has_minimum(100));
        let err = store.require_minimum(100).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData { have: 7, need: 100 });
        // Reason text surfaces both counts for status reports
        let text = err.to_string();
        assert!(text.contains('7') && text.contains("100"));

        store.append(point(100, dec!(1))).unwrap();
        assert!(store.has_minimum(8));
        assert!(store.require_minimum(8).is_ok());
    }
}
