//! Histogram - Pause Time Histogram
//!
//! Logarithmic buckets over nanosecond pause times, for percentiles
//! (P50, P95, P99) in the collection summary.

use std::collections::BTreeMap;

use serde::Serialize;

/// Pause time histogram
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    /// Bucket counts keyed by bit length of the value
    buckets: BTreeMap<u32, u64>,
    count: u64,
    sum: u64,
    min: Option<u64>,
    max: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record value
    pub fn record(&mut self, value: u64) {
        *self.buckets.entry(Self::bucket(value)).or_insert(0) += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(value);
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = self.max.max(value);
    }

    /// Bit length of `value`; bucket `b` holds values below `2^b`
    fn bucket(value: u64) -> u32 {
        64 - value.leading_zeros()
    }

    /// Upper bound of the bucket containing the `p` quantile
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }

        let target = ((self.count as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0;
        for (&bucket, &count) in &self.buckets {
            cumulative += count;
            if cumulative >= target {
                return Self::upper_bound(bucket).min(self.max);
            }
        }
        self.max
    }

    fn upper_bound(bucket: u32) -> u64 {
        match bucket {
            0 => 0,
            64 => u64::MAX,
            b => (1u64 << b) - 1,
        }
    }

    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> u64 {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }

    pub fn mean(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        self.sum / self.count
    }

    pub fn min(&self) -> u64 {
        self.min.unwrap_or(0)
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Summary for reports
    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            count: self.count,
            min: self.min(),
            max: self.max,
            mean: self.mean(),
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
        }
    }
}

/// Serializable histogram summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}
