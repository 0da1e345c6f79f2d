use thiserror::Error;

use crate::config::ConfigError;

/// Growth factor of bucket widths: bucket `i` stands for `BASE^i` ticks.
pub const BASE: f64 = 1.01;

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("logical index must be positive")]
    InvalidArgument,
    #[error("logical index {index} maps to bucket {bucket}, past the last of {allocated}")]
    OutOfRange {
        index: u64,
        bucket: usize,
        allocated: usize,
    },
}

/// Number of buckets needed to cover `size` logical ticks at `base`.
pub fn allocated_size_for(size: usize, base: f64) -> Result<usize, ConfigError> {
    if size <= 1 {
        return Err(ConfigError::HistorySize(size));
    }
    if !(base.is_finite() && base > 1.0) {
        return Err(ConfigError::HistoryBase(base));
    }
    let allocated = ((size as f64).ln() / base.ln()).floor() as usize;
    if allocated < 2 {
        return Err(ConfigError::TooFewBuckets {
            size,
            base,
            allocated,
        });
    }
    Ok(allocated)
}

/// Rate history of unbounded length in `O(log size)` memory.
///
/// Each slot holds the summed mass of a geometrically growing run of ticks.
/// Every `shift` ages the whole array by one tick: from the coarsest bucket down,
/// one tick's worth of average mass moves from each bucket into the next
/// coarser one, then the new sample lands in bucket 1. Recent ticks stay near
/// full resolution; a tick `BASE^k` shifts old is only visible averaged over a
/// run of roughly `BASE^k` ticks.
///
/// Bucket 0 is never written and always reads 0.
#[derive(Clone, Debug)]
pub struct DecayingRateHistory {
    size: usize,
    base: f64,
    values: Vec<f64>,
    // widths[i] == base^i
    widths: Vec<f64>,
}

impl DecayingRateHistory {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        Self::with_base(size, BASE)
    }

    pub fn with_base(size: usize, base: f64) -> Result<Self, ConfigError> {
        let allocated = allocated_size_for(size, base)?;
        let widths = (0..allocated).map(|i| base.powi(i as i32)).collect();
        Ok(Self {
            size,
            base,
            values: vec![0.0; allocated],
            widths,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn allocated_size(&self) -> usize {
        self.values.len()
    }

    /// Ages every bucket by one logical tick and records `value` as the newest.
    ///
    /// NaN samples are stored as 0.
    pub fn shift(&mut self, value: f64) {
        for i in (2..self.values.len()).rev() {
            let borrowed = self.values[i - 1] / self.widths[i - 1];
            self.values[i - 1] -= borrowed;
            // 0/0 must not spread through the coarser buckets.
            if !borrowed.is_nan() {
                self.values[i] += borrowed;
            }
        }
        self.values[1] = if value.is_nan() { 0.0 } else { value };
    }

    /// Average per-tick value of the bucket covering `logical_index` ticks ago.
    pub fn get_value(&self, logical_index: u64) -> Result<f64, HistoryError> {
        if logical_index == 0 {
            return Err(HistoryError::InvalidArgument);
        }
        let bucket = ((logical_index as f64).ln() / self.base.ln()).floor() as usize;
        if bucket >= self.values.len() {
            return Err(HistoryError::OutOfRange {
                index: logical_index,
                bucket,
                allocated: self.values.len(),
            });
        }
        Ok(self.values[bucket] / self.widths[bucket])
    }

    /// The sample passed to the most recent `shift`.
    pub fn latest(&self) -> f64 {
        self.values[1]
    }

    pub fn bucket_mass(&self, bucket: usize) -> Option<f64> {
        self.values.get(bucket).copied()
    }

    pub fn total_mass(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Largest per-tick average over all buckets, never below 0.
    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .zip(&self.widths)
            .map(|(v, w)| v / w)
            .fold(0.0, f64::max)
    }

    /// Same result as [`max_value`](Self::max_value), but visits every
    /// represented sub-tick of every bucket: `O(size)` work.
    pub fn max_value_expanded(&self) -> f64 {
        let mut max = 0.0_f64;
        for (v, &w) in self.values.iter().zip(&self.widths) {
            let mut j = 0.0;
            while j < w {
                max = max.max(v / w);
                j += 1.0;
            }
        }
        max
    }

    /// `(ticks ago, average)` per bucket, newest first. Positions are the
    /// cumulative widths of the buckets before it.
    pub fn iter_logical(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values
            .iter()
            .zip(&self.widths)
            .scan(0.0, |x, (v, w)| {
                let at = *x;
                *x += w;
                Some((at, v / w))
            })
    }

    /// `(bucket index, average)` per bucket, newest first.
    pub fn iter_logarithmic(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .zip(&self.widths)
            .enumerate()
            .map(|(i, (v, w))| (i, v / w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn allocated_size_follows_log_base() {
        let h = DecayingRateHistory::new(1000).unwrap();
        // ln(1000) / ln(1.01) = 694.22
        assert_eq!(h.allocated_size(), 694);
        assert_eq!(DecayingRateHistory::new(2).unwrap().allocated_size(), 69);
    }

    #[test]
    fn first_shift_lands_in_bucket_one() {
        let mut h = DecayingRateHistory::new(1000).unwrap();
        h.shift(5.0);
        assert_eq!(h.bucket_mass(1), Some(5.0));
        for i in (0..h.allocated_size()).filter(|&i| i != 1) {
            assert_eq!(h.bucket_mass(i), Some(0.0), "bucket {i}");
        }
        assert_eq!(h.max_value(), 5.0);
        assert_eq!(h.max_value_expanded(), 5.0);
        assert_eq!(h.latest(), 5.0);
    }

    #[test]
    fn second_shift_carries_one_tick_of_average() {
        let mut h = DecayingRateHistory::new(1000).unwrap();
        h.shift(5.0);
        h.shift(3.0);
        assert!(close(h.bucket_mass(2).unwrap(), 5.0 / 1.01));
        assert_eq!(h.latest(), 3.0);
        assert_eq!(h.bucket_mass(0), Some(0.0));
    }

    #[test]
    fn mass_moves_between_buckets_without_appearing_or_vanishing() {
        let mut h = DecayingRateHistory::new(500).unwrap();
        let samples = [3.0, 0.0, 7.5, 2.0, 11.0, 4.0, 0.5, 9.0, 1.0, 6.0];
        for step in 0..300 {
            let before = h.total_mass();
            let a = h.latest();
            let v = samples[step % samples.len()];
            h.shift(v);
            // the remainder left in bucket 1 is overwritten by the new sample
            let expected = before - (a - a / BASE) + v;
            assert!(close(h.total_mass(), expected), "step {step}");
        }
    }

    #[test]
    fn coarsest_bucket_keeps_what_it_receives() {
        let mut h = DecayingRateHistory::with_base(8, 2.0).unwrap();
        assert_eq!(h.allocated_size(), 3);
        h.shift(4.0);
        h.shift(0.0);
        assert!(close(h.bucket_mass(2).unwrap(), 2.0));
        for _ in 0..10 {
            h.shift(0.0);
        }
        assert!(close(h.bucket_mass(2).unwrap(), 2.0));
    }

    #[test]
    fn nan_sample_is_stored_as_zero() {
        let mut h = DecayingRateHistory::new(100).unwrap();
        h.shift(f64::NAN);
        assert_eq!(h.latest(), 0.0);
        h.shift(1.0);
        assert!(h.total_mass().is_finite());
    }

    #[test]
    fn nan_borrow_is_not_carried() {
        let mut h = DecayingRateHistory::with_base(8, 2.0).unwrap();
        h.values[1] = f64::NAN;
        h.values[2] = 1.0;
        h.shift(0.0);
        assert_eq!(h.bucket_mass(2), Some(1.0));
        assert_eq!(h.latest(), 0.0);
    }

    #[test]
    fn get_value_reads_bucket_average() {
        let mut h = DecayingRateHistory::with_base(64, 2.0).unwrap();
        h.shift(6.0);
        h.shift(0.0);
        // bucket 2 covers logical indices 4..8 and holds 6 / 2
        assert!(close(h.get_value(4).unwrap(), 3.0 / 4.0));
        assert!(close(h.get_value(7).unwrap(), 3.0 / 4.0));
        assert_eq!(h.get_value(1).unwrap(), 0.0);
    }

    #[test]
    fn get_value_rejects_zero_and_out_of_range() {
        let h = DecayingRateHistory::with_base(64, 2.0).unwrap();
        assert_eq!(h.get_value(0), Err(HistoryError::InvalidArgument));
        assert!(matches!(
            h.get_value(1 << 20),
            Err(HistoryError::OutOfRange { bucket: 20, allocated: 6, .. })
        ));
    }

    #[test]
    fn iterators_cover_every_bucket_in_order() {
        let mut h = DecayingRateHistory::new(1000).unwrap();
        for v in [1.0, 2.0, 3.0] {
            h.shift(v);
        }
        let logical: Vec<_> = h.iter_logical().collect();
        let logarithmic: Vec<_> = h.iter_logarithmic().collect();
        assert_eq!(logical.len(), h.allocated_size());
        assert_eq!(logarithmic.len(), h.allocated_size());
        assert!(logical.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(logarithmic.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(logical[0], (0.0, 0.0));
        assert_eq!(logical[1].0, 1.0);
        assert!(close(logical[1].1, 3.0 / 1.01));
        assert_eq!(logarithmic[1].0, 1);
        assert!(close(logarithmic[1].1, 3.0 / 1.01));
        assert!(close(logical[2].0, 2.01));
        // restartable
        assert_eq!(h.iter_logical().count(), h.allocated_size());
    }

    #[test]
    fn both_max_variants_agree() {
        let mut h = DecayingRateHistory::new(300).unwrap();
        for step in 0..200 {
            h.shift(((step * 7) % 13) as f64);
            assert_eq!(h.max_value(), h.max_value_expanded());
        }
    }

    #[test]
    fn old_spikes_flatten_while_keeping_mass() {
        let mut h = DecayingRateHistory::new(10_000).unwrap();
        h.shift(100.0);
        for _ in 0..400 {
            h.shift(0.0);
        }
        assert!(h.max_value() < 100.0);
        let spread = h.iter_logarithmic().filter(|&(_, avg)| avg > 0.0).count();
        assert!(spread > 10);
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert_eq!(DecayingRateHistory::new(1).unwrap_err(), ConfigError::HistorySize(1));
        assert_eq!(
            DecayingRateHistory::with_base(100, 1.0).unwrap_err(),
            ConfigError::HistoryBase(1.0)
        );
        assert!(matches!(
            DecayingRateHistory::with_base(3, 2.0),
            Err(ConfigError::TooFewBuckets { allocated: 1, .. })
        ));
    }
}
