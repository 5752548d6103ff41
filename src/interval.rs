//! Disjoint integer interval sets.
//!
//! An [`IntervalSet`] tracks which parts of the 32-bit value space are still
//! unclaimed for one field. The mapping generator walks rules in precedence
//! order and calls [`IntervalSet::remove`] per rule; the returned intersection
//! is value space no earlier rule covers.

use rand::Rng;

/// A sorted set of disjoint inclusive `[low, high]` ranges over `u32`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    ranges: Vec<(u32, u32)>,
}

impl IntervalSet {
    /// Create a set holding the single range `[low, high]`.
    pub fn new(low: u32, high: u32) -> Self {
        Self {
            ranges: vec![(low, high)],
        }
    }

    /// Create a set covering the full 32-bit universe.
    pub fn full() -> Self {
        Self::new(0, u32::MAX)
    }

    /// Subtract `[low, high]` from this set and return the intersection that
    /// was held, as an independent set.
    ///
    /// The result is a subset of `[low, high]` and disjoint from this set's
    /// post-call contents.
    pub fn remove(&mut self, low: u32, high: u32) -> Self {
        let mut claimed = Vec::new();
        let mut remaining = Vec::with_capacity(self.ranges.len() + 1);

        let mut iter = self.ranges.iter().copied();
        for (lo, hi) in iter.by_ref() {
            // Entirely below the removed region
            if hi < low {
                remaining.push((lo, hi));
                continue;
            }
            // Ranges are sorted; nothing past this point can overlap
            if lo > high {
                remaining.push((lo, hi));
                break;
            }

            let clip_lo = lo.max(low);
            let clip_hi = hi.min(high);
            if lo < clip_lo {
                remaining.push((lo, clip_lo - 1));
            }
            claimed.push((clip_lo, clip_hi));
            if clip_hi < hi {
                remaining.push((clip_hi + 1, hi));
            }
        }
        remaining.extend(iter);

        self.ranges = remaining;
        Self { ranges: claimed }
    }

    /// A uniformly chosen value from a uniformly chosen held range, or 0 if
    /// the set is empty.
    ///
    /// Ranges are selected by count, not by covered width, so values cluster
    /// in narrow fragments when many small gaps exist.
    pub fn random_value<R: Rng>(&self, rng: &mut R) -> u32 {
        if self.ranges.is_empty() {
            return 0;
        }
        let (low, high) = self.ranges[rng.gen_range(0..self.ranges.len())];
        rng.gen_range(low..=high)
    }

    /// Number of held ranges.
    pub fn size(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true iff the set holds no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns true iff `value` lies inside one of the held ranges.
    pub fn contains(&self, value: u32) -> bool {
        self.ranges
            .iter()
            .any(|&(low, high)| value >= low && value <= high)
    }

    /// Total number of values covered by the held ranges.
    pub fn covered_width(&self) -> u64 {
        self.ranges
            .iter()
            .map(|&(low, high)| u64::from(high) - u64::from(low) + 1)
            .sum()
    }

    /// Held ranges in ascending order.
    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}
