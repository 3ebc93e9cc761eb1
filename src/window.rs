// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Rolling average of CPU temperature samples.
//!
//! The window keeps the newest `sample_size` readings. A gap longer than
//! [`STALENESS_THRESHOLD`] between two samples discards the history, so a
//! restart after maintenance starts a fresh average instead of dragging
//! hours-old readings along.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of samples averaged before fans are driven.
pub const DEFAULT_SAMPLE_SIZE: usize = 3;

/// Maximum gap between consecutive samples before history is dropped.
pub const STALENESS_THRESHOLD: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationWindow {
    sample_size: usize,
    /// Oldest first.
    samples: Vec<f64>,
    last_sample_time: Option<DateTime<Utc>>,
}

impl Default for AggregationWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl AggregationWindow {
    /// `sample_size` must be positive; config validation guarantees it.
    pub fn new(sample_size: usize) -> Self {
        Self {
            sample_size,
            samples: Vec::with_capacity(sample_size),
            last_sample_time: None,
        }
    }

    /// Add a reading taken at `now` and return the mean of the retained
    /// samples.
    pub fn add_sample(&mut self, value: f64, now: DateTime<Utc>) -> f64 {
        if let Some(last) = self.last_sample_time {
            // A negative gap (clock stepped back) does not count as stale.
            let stale = (now - last)
                .to_std()
                .is_ok_and(|gap| gap > STALENESS_THRESHOLD);
            if stale {
                log::info!(
                    "Last sample was taken at {last}, discarding {} stale sample(s)",
                    self.samples.len()
                );
                self.samples.clear();
            }
        }

        self.samples.push(value);
        self.truncate();
        self.last_sample_time = Some(now);

        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Change the window size, dropping the oldest samples if it shrinks.
    pub fn set_sample_size(&mut self, sample_size: usize) {
        self.sample_size = sample_size;
        self.truncate();
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn last_sample_time(&self) -> Option<DateTime<Utc>> {
        self.last_sample_time
    }

    /// True once the window holds `sample_size` samples since the last reset.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.sample_size
    }

    fn truncate(&mut self) {
        if self.samples.len() > self.sample_size {
            let excess = self.samples.len() - self.sample_size;
            self.samples.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_mean_of_retained_samples() {
        let mut w = AggregationWindow::new(3);
        assert_eq!(w.add_sample(40.0, t0()), 40.0);
        assert_eq!(w.add_sample(50.0, t0() + TimeDelta::seconds(10)), 45.0);
        assert_eq!(w.add_sample(60.0, t0() + TimeDelta::seconds(20)), 50.0);
        // 40 falls out of the window
        assert_eq!(w.add_sample(70.0, t0() + TimeDelta::seconds(30)), 60.0);
        assert_eq!(w.samples(), &[50.0, 60.0, 70.0]);
    }

    #[test]
    fn test_records_last_sample_time() {
        let mut w = AggregationWindow::new(2);
        assert_eq!(w.last_sample_time(), None);
        let now = t0() + TimeDelta::minutes(5);
        w.add_sample(42.0, now);
        assert_eq!(w.last_sample_time(), Some(now));
    }

    #[test]
    fn test_stale_history_is_discarded() {
        let mut w = AggregationWindow::new(3);
        w.add_sample(50.0, t0());
        let mean = w.add_sample(90.0, t0() + TimeDelta::minutes(61));
        assert_eq!(mean, 90.0);
        assert_eq!(w.samples(), &[90.0]);
        assert!(!w.is_full());
    }

    #[test]
    fn test_gap_at_threshold_keeps_history() {
        let mut w = AggregationWindow::new(3);
        w.add_sample(50.0, t0());
        let mean = w.add_sample(90.0, t0() + TimeDelta::hours(1));
        assert_eq!(mean, 70.0);
    }

    #[test]
    fn test_shrinking_sample_size_keeps_newest() {
        let mut w = AggregationWindow::new(5);
        for (i, v) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            w.add_sample(v, t0() + TimeDelta::seconds(i as i64));
        }
        w.set_sample_size(2);
        assert_eq!(w.samples(), &[4.0, 5.0]);

        for i in 0..10 {
            w.add_sample(f64::from(i), t0() + TimeDelta::seconds(10 + i64::from(i)));
            assert!(w.samples().len() <= 2);
        }
    }

    #[test]
    fn test_growing_sample_size_does_not_pad() {
        let mut w = AggregationWindow::new(2);
        w.add_sample(30.0, t0());
        w.add_sample(32.0, t0() + TimeDelta::seconds(10));
        assert!(w.is_full());
        w.set_sample_size(4);
        assert_eq!(w.samples(), &[30.0, 32.0]);
        assert!(!w.is_full());
    }
}
