//! Bounded per-metric history and derived statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::conversion::round_to;

/// Default number of points kept per metric.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Number of trailing values exposed in [`Statistics::last5`].
const TRAILING_VALUES: usize = 5;

/// A single timestamped value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Snapshot of the aggregates over the current history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub current: f64,
    pub minimum: f64,
    pub maximum: f64,
    /// Rounded to one decimal place.
    pub average: f64,
    pub count: usize,
    pub last5: Vec<f64>,
}

impl Statistics {
    /// Compute statistics over an oldest-first sequence of values.
    ///
    /// Returns `None` for an empty sequence.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let current = *values.last()?;

        let mut minimum = f64::MAX;
        let mut maximum = f64::MIN;
        let mut sum = 0.0;
        for &v in values {
            minimum = minimum.min(v);
            maximum = maximum.max(v);
            sum += v;
        }

        let tail_start = values.len().saturating_sub(TRAILING_VALUES);
        Some(Self {
            current,
            minimum,
            maximum,
            average: round_to(sum / values.len() as f64, 1),
            count: values.len(),
            last5: values[tail_start..].to_vec(),
        })
    }
}

/// Fixed-capacity FIFO of history points. Statistics are recomputed on every push.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
    statistics: Option<Statistics>,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
            statistics: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, point: HistoryPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
        self.statistics = Statistics::compute(&self.values());
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }

    pub fn oldest(&self) -> Option<&HistoryPoint> {
        self.points.front()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    /// Values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn points(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    /// The most recent `samples` values, left-padded with zeros when the
    /// history is shorter. Oldest first.
    pub fn graph_data(&self, samples: usize) -> Vec<f64> {
        let stored = self.points.len();
        if stored >= samples {
            return self.points.iter().skip(stored - samples).map(|p| p.value).collect();
        }

        let mut data = vec![0.0; samples - stored];
        data.extend(self.points.iter().map(|p| p.value));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn filled(values: &[f64]) -> HistoryBuffer {
        let mut buf = HistoryBuffer::default();
        for (i, &v) in values.iter().enumerate() {
            buf.push(HistoryPoint { timestamp: at(i as i64), value: v });
        }
        buf
    }

    #[test]
    fn test_statistics() {
        let buf = filled(&[10.0, 20.0, 15.0, 30.0, 5.0]);
        let stats = buf.statistics().unwrap();
        assert_eq!(stats.current, 5.0);
        assert_eq!(stats.minimum, 5.0);
        assert_eq!(stats.maximum, 30.0);
        assert_eq!(stats.average, 16.0);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.last5, vec![10.0, 20.0, 15.0, 30.0, 5.0]);
    }

    #[test]
    fn test_last5_short_and_long_history() {
        let buf = filled(&[1.0, 2.0]);
        assert_eq!(buf.statistics().unwrap().last5, vec![1.0, 2.0]);

        let buf = filled(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(buf.statistics().unwrap().last5, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_average_rounded_to_one_decimal() {
        let buf = filled(&[1.0, 2.0, 2.0]);
        assert_eq!(buf.statistics().unwrap().average, 1.7);
    }

    #[test]
    fn test_average_ties_round_to_even() {
        assert_eq!(filled(&[0.0, 0.5]).statistics().unwrap().average, 0.2);
        assert_eq!(filled(&[0.5, 1.0]).statistics().unwrap().average, 0.8);
    }

    #[test]
    fn test_empty_has_no_statistics() {
        assert!(HistoryBuffer::default().statistics().is_none());
        assert!(Statistics::compute(&[]).is_none());
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buf = HistoryBuffer::new(3);
        for i in 0..3 {
            buf.push(HistoryPoint { timestamp: at(i), value: i as f64 });
        }
        assert_eq!(buf.oldest().unwrap().timestamp, at(0));

        buf.push(HistoryPoint { timestamp: at(3), value: 3.0 });
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.oldest().unwrap().timestamp, at(1));
        assert_eq!(buf.values(), vec![1.0, 2.0, 3.0]);
        assert_eq!(buf.statistics().unwrap().count, 3);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut buf = HistoryBuffer::default();
        for i in 0..250 {
            buf.push(HistoryPoint { timestamp: at(i), value: i as f64 });
            assert!(buf.len() <= DEFAULT_HISTORY_CAPACITY);
        }
        assert_eq!(buf.oldest().unwrap().value, 150.0);
    }

    #[test]
    fn test_graph_data_padding() {
        let buf = filled(&[4.0, 5.0, 6.0]);
        assert_eq!(buf.graph_data(5), vec![0.0, 0.0, 4.0, 5.0, 6.0]);
        assert_eq!(buf.graph_data(2), vec![5.0, 6.0]);
        assert_eq!(buf.graph_data(3), vec![4.0, 5.0, 6.0]);
        assert_eq!(HistoryBuffer::default().graph_data(3), vec![0.0, 0.0, 0.0]);
    }
}
