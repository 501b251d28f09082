//! Convergence of leakage estimates as the number of samples grows.
//!
//! A leakage curve is `delta`-converged from sample size `s` if every
//! estimate from `s` onwards lies within `delta` (relative or absolute)
//! of the estimate on the largest prefix, and there are at least `q`
//! such estimates. `leakage_curve()` estimates the mutual information on
//! growing prefixes of the samples and reports, for each `delta`, where
//! the curve settled.
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{mutual_information, min_samples_for, EstimatorParams, Samples};
use crate::error::{InsufficientSamplesError, LeakageError};

/// Estimate at one sample size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub samples: usize,
    pub estimate: f64,
}

/// Distance of an estimate from the reference (final) one.
///
/// A relative distance from a zero reference is 0 if the estimate is
/// also 0, and infinite otherwise.
fn distance(estimate: f64, reference: f64, relative: bool) -> f64 {
    let diff = (estimate - reference).abs();
    if !relative {
        diff
    } else if reference != 0. {
        diff / reference.abs()
    } else if diff == 0. {
        0.
    } else {
        f64::INFINITY
    }
}

/// Tracks where a growing leakage curve settles, for several deltas.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    // Ascending, without duplicates.
    deltas: Vec<f64>,
    window: usize,
    relative: bool,
    points: Vec<CurvePoint>,
}

impl ConvergenceChecker {
    /// Deltas must be positive and finite, and there must be at least
    /// one. `q` is the number of trailing estimates that must agree.
    pub fn new(deltas: &[f64], q: usize, relative: bool)
            -> Result<ConvergenceChecker, LeakageError> {
        if deltas.is_empty() {
            return Err(LeakageError::InvalidParams("no convergence deltas".into()));
        }
        if deltas.iter().any(|d| !(*d > 0.) || !d.is_finite()) {
            return Err(LeakageError::InvalidParams(
                    "convergence deltas must be positive".into()));
        }
        if q == 0 {
            return Err(LeakageError::InvalidParams("q must be at least 1".into()));
        }

        let mut deltas = deltas.to_owned();
        deltas.sort_by_key(|d| OrderedFloat::from(*d));
        deltas.dedup();

        Ok(ConvergenceChecker { deltas, window: q, relative, points: Vec::new() })
    }

    /// Adds the estimate on a larger prefix.
    pub fn push(&mut self, point: CurvePoint) -> Result<(), LeakageError> {
        if let Some(last) = self.points.last() {
            if point.samples <= last.samples {
                return Err(LeakageError::InvalidParams(format!(
                    "curve points must grow: {} samples after {}",
                    point.samples, last.samples)));
            }
        }
        self.points.push(point);
        Ok(())
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Number of trailing points within `delta` of the last estimate.
    fn stable_tail(&self, delta: f64) -> usize {
        let reference = match self.points.last() {
            Some(p) => p.estimate,
            None => return 0,
        };
        self.points.iter()
                   .rev()
                   .take_while(|p| distance(p.estimate, reference, self.relative) <= delta)
                   .count()
    }

    /// Sample size from which the curve stays within `delta` of its last
    /// estimate, however few points that is.
    pub fn stable_from(&self, delta: f64) -> Option<usize> {
        let tail = self.stable_tail(delta);
        if tail == 0 {
            return None;
        }
        Some(self.points[self.points.len() - tail].samples)
    }

    /// Like `stable_from`, but only if at least `q` points agree.
    pub fn converged_at(&self, delta: f64) -> Option<usize> {
        if self.stable_tail(delta) < self.window {
            return None;
        }
        self.stable_from(delta)
    }

    /// `(delta, converged_at(delta))` for each delta, ascending.
    pub fn summary(&self) -> Vec<(f64, Option<usize>)> {
        self.deltas.iter().map(|d| (*d, self.converged_at(*d))).collect()
    }

    pub fn all_converged(&self) -> bool {
        self.deltas.iter().all(|d| self.converged_at(*d).is_some())
    }

    /// Largest distance from the last estimate among the last `q` points.
    pub fn spread(&self) -> Option<f64> {
        let reference = self.points.last()?.estimate;
        self.points.iter()
                   .rev()
                   .take(self.window)
                   .map(|p| distance(p.estimate, reference, self.relative))
                   .max_by_key(|d| OrderedFloat::from(*d))
    }
}

/// Mutual information as a function of the number of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageCurve {
    pub points: Vec<CurvePoint>,
    /// For each delta (ascending), the sample size from which the
    /// estimate converged, if it did.
    pub converged: Vec<(f64, Option<usize>)>,
}

impl LeakageCurve {
    /// The estimate on the largest prefix.
    pub fn last(&self) -> Option<f64> {
        self.points.last().map(|p| p.estimate)
    }
}

/// Estimates the mutual information on the first `n` samples, for each
/// `n` in `sizes`, and tracks the convergence of the estimates.
///
/// Sizes below the sample floor of `params` are skipped; sizes above
/// the number of samples are clamped to it.
pub fn leakage_curve(secret: &Samples, output: &Samples, params: &EstimatorParams,
                     sizes: &[usize], deltas: &[f64], q: usize, relative: bool)
        -> Result<LeakageCurve, LeakageError> {
    let n = secret.len();
    if n != output.len() {
        return Err(LeakageError::LengthMismatch { secret: n, output: output.len() });
    }
    let floor = min_samples_for(params);
    let mut checker = ConvergenceChecker::new(deltas, q, relative)?;

    let mut sizes = sizes.iter()
                         .map(|s| (*s).min(n))
                         .filter(|s| *s >= floor)
                         .collect::<Vec<_>>();
    sizes.sort_unstable();
    sizes.dedup();
    if sizes.is_empty() {
        return Err(InsufficientSamplesError { available: n, required: floor }.into());
    }

    for &size in &sizes {
        let estimate = mutual_information(&secret.prefix(size), &output.prefix(size),
                                          params)?;
        debug!(size, estimate, "leakage curve point");
        checker.push(CurvePoint { samples: size, estimate })?;
    }

    Ok(LeakageCurve { converged: checker.summary(), points: checker.points().to_vec() })
}

/// Evenly spaced prefix sizes, from `first` to `n` in `steps` steps.
pub fn linear_sizes(first: usize, n: usize, steps: usize) -> Vec<usize> {
    if steps <= 1 || first >= n {
        return vec![n];
    }
    let stride = (n - first) as f64 / (steps - 1) as f64;
    (0..steps).map(|i| first + (i as f64 * stride).round() as usize)
              .collect()
}
