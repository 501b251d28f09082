//! How much of a range a candidate distribution covers.
//!
//! Discrete candidates cover the integers of the range they put enough
//! mass on. Continuous candidates cover the bins of the range they put
//! enough mass in, where the range is split in bins of equal mass under
//! a reference distribution (by default, uniform over the range).
use serde::{Deserialize, Serialize};

use crate::distributions::{Dist, DistKind, Support};
use crate::error::InvalidParameterError;

/// Bound used in place of an infinite end of a range.
pub const RANGE_LIMIT: f64 = 1000.;
/// Bounds are exact integers up to here.
const EXACT_LIMIT: f64 = 9_007_199_254_740_992.;

/// When is a candidate distribution adequate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoveragePolicy {
    /// Support points (discrete) or bins (continuous) that must hold
    /// some mass.
    pub minimum_coverage: usize,
    /// Mass a point or bin needs to count as covered.
    pub mass_floor: f64,
    /// Draws tried before giving up on a candidate.
    pub max_attempts: usize,
    /// Most integers a discrete range may hold; also caps the points
    /// examined per candidate.
    pub max_points: usize,
}

impl Default for CoveragePolicy {
    fn default() -> CoveragePolicy {
        CoveragePolicy {
            minimum_coverage: 5,
            mass_floor: 1e-4,
            max_attempts: 100,
            max_points: 100_000,
        }
    }
}

fn range_fault(reason: &str) -> InvalidParameterError {
    InvalidParameterError {
        variable: "*".to_owned(),
        kind: "Ranges".to_owned(),
        param: "ranges".to_owned(),
        reason: reason.to_owned(),
    }
}

/// Values an attacker believes a variable can take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranges {
    pub lower: f64,
    pub upper: f64,
}

impl Ranges {
    /// Infinite bounds are replaced by `-RANGE_LIMIT` and `RANGE_LIMIT`.
    pub fn new(lower: f64, upper: f64) -> Result<Ranges, InvalidParameterError> {
        if lower.is_nan() || upper.is_nan() {
            return Err(range_fault("bounds must be numbers"));
        }
        if lower >= upper {
            return Err(range_fault("bounds must be increasing"));
        }
        let lower = if lower == f64::NEG_INFINITY { -RANGE_LIMIT } else { lower };
        let upper = if upper == f64::INFINITY { RANGE_LIMIT } else { upper };
        if lower >= upper {
            return Err(range_fault("bounds must be increasing"));
        }
        if lower.abs() > EXACT_LIMIT || upper.abs() > EXACT_LIMIT {
            return Err(range_fault("bounds must be within 2^53"));
        }
        Ok(Ranges { lower, upper })
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    /// Number of integers in the range.
    pub fn integer_count(&self) -> f64 {
        (self.upper.floor() - self.lower.ceil() + 1.).max(0.)
    }

    /// Fails if the range holds more integers than `policy` allows.
    pub fn check_integer_count(&self, policy: &CoveragePolicy)
            -> Result<(), InvalidParameterError> {
        if self.integer_count() > policy.max_points as f64 {
            return Err(range_fault(&format!(
                "integer ranges may hold at most {} values", policy.max_points)));
        }
        Ok(())
    }

    /// Integers in the range.
    pub fn integers(&self) -> impl Iterator<Item = i64> {
        (self.lower.ceil() as i64)..=(self.upper.floor() as i64)
    }

    /// `m` equal-width bins spanning the range.
    pub fn bins(&self, m: usize) -> Vec<(f64, f64)> {
        let width = self.width() / m as f64;
        (0..m).map(|i| (self.lower + i as f64 * width,
                        if i + 1 == m { self.upper }
                        else { self.lower + (i + 1) as f64 * width }))
              .collect()
    }

    /// `m` bins spanning the range, each holding the same mass under
    /// `reference`. Equal-width bins if `reference` has no mass in the
    /// range.
    pub fn quantile_bins(&self, reference: &Dist, m: usize) -> Vec<(f64, f64)> {
        let low = reference.cdf(self.lower);
        let high = reference.cdf(self.upper);
        if !(high > low) {
            return self.bins(m);
        }
        let mut edges = Vec::with_capacity(m + 1);
        edges.push(self.lower);
        for i in 1..m {
            let q = low + (high - low) * i as f64 / m as f64;
            let edge = reference.quantile(q).max(self.lower).min(self.upper);
            edges.push(edge.max(edges[i - 1]));
        }
        edges.push(self.upper);
        edges.windows(2).map(|w| (w[0], w[1])).collect()
    }

    fn continuous_bins(&self, reference: Option<&Dist>, m: usize) -> Vec<(f64, f64)> {
        match reference {
            Some(reference) => self.quantile_bins(reference, m),
            None => self.bins(m),
        }
    }
}

/// Integers of `ranges` that can hold at least `floor` mass under
/// `dist`, at most `cap` of them.
fn candidate_points(dist: &Dist, ranges: &Ranges, floor: f64, cap: usize)
        -> impl Iterator<Item = i64> {
    // A point with mass `floor` lies between these two quantiles.
    let first = dist.quantile(0.5 * floor);
    let last = dist.quantile(1. - 0.5 * floor);
    let lower = if first.is_nan() { ranges.lower } else { first.max(ranges.lower) };
    let upper = if last.is_nan() { ranges.upper } else { last.min(ranges.upper) };
    let window = if lower <= upper { Ranges { lower, upper } }
                 else { Ranges { lower: 1., upper: 0. } };
    window.integers().take(cap)
}

/// Number of covered points (discrete) or bins (continuous).
///
/// Continuous bins hold equal mass under `reference`, or equal width if
/// there is none.
pub fn coverage(dist: &Dist, ranges: &Ranges, reference: Option<&Dist>,
                policy: &CoveragePolicy) -> usize {
    if dist.is_discrete() {
        candidate_points(dist, ranges, policy.mass_floor, policy.max_points)
            .filter(|k| dist.ln_density(*k as f64).exp() >= policy.mass_floor)
            .count()
    } else {
        ranges.continuous_bins(reference, policy.minimum_coverage)
              .into_iter()
              .filter(|(a, b)| dist.mass(*a, *b) >= policy.mass_floor)
              .count()
    }
}

/// Most a distribution of `kind` could possibly cover, whatever its
/// parameters.
pub fn max_coverage(kind: DistKind, ranges: &Ranges, reference: Option<&Dist>,
                    policy: &CoveragePolicy) -> usize {
    let support = Support::of_kind(kind);
    if kind.is_discrete() {
        let shared = Ranges { lower: ranges.lower.max(support.lower),
                              upper: ranges.upper.min(support.upper) };
        shared.integer_count().min(policy.max_points as f64) as usize
    } else {
        ranges.continuous_bins(reference, policy.minimum_coverage)
              .into_iter()
              .filter(|(a, b)| *b > support.lower && *a < support.upper)
              .count()
    }
}
