//! ADWIN (ADaptive WINdowing)
//!
//! Keeps a variable-length window of recent values compressed into an
//! exponential histogram: row `k` holds buckets summarizing `2^k` values,
//! at most `max_buckets` per row. Memory is `O(max_buckets * log(width))`.
//!
//! Every update checks all bucket boundaries as split points between an
//! older and a newer sub-window. When the two means differ by more than a
//! variance-aware Hoeffding bound, the oldest bucket is dropped and the check
//! repeats until no split is significant.
//!
//! Bifet, A. and Gavalda, R., 2007. Learning from time-changing data with
//! adaptive windowing.

use std::collections::VecDeque;

use super::DriftDetector;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    total: f64,
    /// Sum of squared deviations from the bucket mean
    variance: f64,
    count: u64,
}

impl Bucket {
    fn single(value: f64) -> Self {
        Self {
            total: value,
            variance: 0.0,
            count: 1,
        }
    }

    fn mean(&self) -> f64 {
        self.total / self.count as f64
    }

    fn merge(older: Bucket, newer: Bucket) -> Self {
        let n0 = older.count as f64;
        let n1 = newer.count as f64;
        let diff = older.mean() - newer.mean();
        Self {
            total: older.total + newer.total,
            variance: older.variance + newer.variance + n0 * n1 / (n0 + n1) * diff * diff,
            count: older.count + newer.count,
        }
    }
}

/// ADWIN drift detector
#[derive(Debug, Clone)]
pub struct Adwin {
    /// Confidence parameter (smaller = less sensitive)
    delta: f64,
    /// `rows[k]` holds buckets of `2^k` values, newest at the front
    rows: Vec<VecDeque<Bucket>>,
    total: f64,
    variance: f64,
    width: u64,
    max_buckets: usize,
    /// Minimum size of each sub-window when testing a split
    min_window_length: u64,
    /// No split is tested until the window holds this many values
    grace_period: u64,
    drift_detected: bool,
    detections: u64,
}

impl Default for Adwin {
    fn default() -> Self {
        Self::new(0.002)
    }
}

impl Adwin {
    /// Create a new detector.
    ///
    /// `delta` is clamped into `(0, 1)`; typical values are 0.001 to 0.01.
    pub fn new(delta: f64) -> Self {
        let delta = if delta.is_finite() {
            delta.clamp(1e-12, 0.999_999)
        } else {
            0.002
        };
        Self {
            delta,
            rows: Vec::new(),
            total: 0.0,
            variance: 0.0,
            width: 0,
            max_buckets: 5,
            min_window_length: 5,
            grace_period: 10,
            drift_detected: false,
            detections: 0,
        }
    }

    pub fn with_grace_period(mut self, grace_period: u64) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_min_window_length(mut self, min_window_length: u64) -> Self {
        self.min_window_length = min_window_length.max(1);
        self
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Current window width
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Mean of the current window
    pub fn mean(&self) -> f64 {
        if self.width > 0 {
            self.total / self.width as f64
        } else {
            0.0
        }
    }

    /// Population variance of the current window
    pub fn variance(&self) -> f64 {
        if self.width > 0 {
            self.variance / self.width as f64
        } else {
            0.0
        }
    }

    /// Number of updates that flagged drift
    pub fn detections(&self) -> u64 {
        self.detections
    }

    fn bucket_count(&self) -> usize {
        self.rows.iter().map(VecDeque::len).sum()
    }

    fn insert(&mut self, value: f64) {
        if self.width > 0 {
            let n = self.width as f64;
            let diff = value - self.mean();
            self.variance += n / (n + 1.0) * diff * diff;
        }
        self.total += value;
        self.width += 1;

        if self.rows.is_empty() {
            self.rows.push(VecDeque::new());
        }
        self.rows[0].push_front(Bucket::single(value));
        self.compress();
    }

    fn compress(&mut self) {
        let mut level = 0;
        while level < self.rows.len() {
            if self.rows[level].len() <= self.max_buckets {
                break;
            }
            let (Some(older), Some(newer)) = (self.rows[level].pop_back(), self.rows[level].pop_back())
            else {
                break;
            };
            if level + 1 == self.rows.len() {
                self.rows.push(VecDeque::new());
            }
            // Everything in the next row is older than the merged pair.
            self.rows[level + 1].push_front(Bucket::merge(older, newer));
            level += 1;
        }
    }

    fn drop_oldest(&mut self) {
        let Some(bucket) = self.rows.last_mut().and_then(VecDeque::pop_back) else {
            return;
        };
        while self.rows.last().is_some_and(VecDeque::is_empty) {
            self.rows.pop();
        }

        let remaining = self.width - bucket.count;
        if remaining == 0 {
            self.total = 0.0;
            self.variance = 0.0;
            self.width = 0;
            return;
        }

        let n = remaining as f64;
        let rest_mean = (self.total - bucket.total) / n;
        let diff = bucket.mean() - rest_mean;
        self.variance -= bucket.variance
            + bucket.count as f64 * n / self.width as f64 * diff * diff;
        self.variance = self.variance.max(0.0);
        self.total -= bucket.total;
        self.width = remaining;
    }

    /// Test every bucket boundary as a split point, oldest first.
    fn has_cut(&self) -> bool {
        if self.width < self.grace_period || self.bucket_count() < 2 {
            return false;
        }

        let width = self.width as f64;
        let variance = self.variance();
        let log_term = (2.0 * width.ln().max(1.0) / self.delta).ln();
        let min_len = self.min_window_length;

        let mut n0: u64 = 0;
        let mut sum0 = 0.0;

        for bucket in self.rows.iter().rev().flat_map(|row| row.iter().rev()) {
            n0 += bucket.count;
            sum0 += bucket.total;
            let n1 = self.width - n0;

            if n1 < min_len {
                break;
            }
            if n0 < min_len {
                continue;
            }

            let mean0 = sum0 / n0 as f64;
            let mean1 = (self.total - sum0) / n1 as f64;
            let m_recip =
                1.0 / (n0 - min_len + 1) as f64 + 1.0 / (n1 - min_len + 1) as f64;
            let epsilon = (2.0 * m_recip * variance * log_term).sqrt()
                + 2.0 / 3.0 * log_term * m_recip;

            if (mean0 - mean1).abs() > epsilon {
                return true;
            }
        }

        false
    }
}

impl DriftDetector for Adwin {
    fn update(&mut self, value: f64) -> bool {
        self.drift_detected = false;
        if !value.is_finite() {
            return false;
        }

        self.insert(value);

        while self.has_cut() {
            self.drift_detected = true;
            self.drop_oldest();
        }

        if self.drift_detected {
            self.detections += 1;
        }
        self.drift_detected
    }

    fn drift_detected(&self) -> bool {
        self.drift_detected
    }

    fn samples_seen(&self) -> u64 {
        self.width
    }
}
