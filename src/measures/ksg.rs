//! Kraskov-Stögbauer-Grassberger estimate of the mutual information
//! between two continuous random vectors.
//!
//! This is the first algorithm of [1]: for each sample, `eps` is the
//! max-norm distance to its `k`-th neighbor in the joint space, and
//! `n_x`, `n_y` count the samples strictly closer than `eps` in each
//! marginal space. Then
//!
//! ```text
//! I(X; Y) = psi(N) + psi(k) - < psi(n_x + 1) + psi(n_y + 1) >.
//! ```
//!
//! # References
//! [1] A. Kraskov, H. Stögbauer and P. Grassberger, "Estimating mutual
//!     information". Phys. Rev. E 69, 2004.
use ndarray::prelude::*;
use ndarray::concatenate;
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use statrs::function::gamma::digamma;

use super::neighbors::PointSet;
use crate::utils::scale_unit_variance;

/// Scales every column to unit variance and adds a tiny amount of
/// noise, which breaks ties between repeated values.
pub fn prepare<R: Rng + ?Sized>(values: &ArrayView2<f64>, rng: &mut R) -> Array2<f64> {
    let mut values = values.to_owned();
    scale_unit_variance(&mut values);
    let n = values.nrows().max(1) as f64;
    for mut column in values.columns_mut() {
        let amplitude = 1e-10 * (column.iter().map(|x| x.abs()).sum::<f64>() / n).max(1.);
        for x in column.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);
            *x += amplitude * z;
        }
    }
    values
}

/// KSG estimate, in nats, with `k` neighbors. `x` and `y` must have the
/// same number of rows, more than `k`. The estimate can be negative.
pub fn ksg(x: &ArrayView2<f64>, y: &ArrayView2<f64>, k: usize) -> f64 {
    let n = x.nrows();
    let joint = match concatenate(Axis(1), &[x.view(), y.view()]) {
        Ok(joint) => joint,
        Err(_) => return 0.,
    };
    let joint_set = PointSet::new(joint.view());
    let x_set = PointSet::new(x.view());
    let y_set = PointSet::new(y.view());

    let marginals = (0..n).into_par_iter()
        .map(|i| {
            let eps = joint_set.kth_neighbor_distance(i, k);
            let nx = x_set.count_within(i, eps);
            let ny = y_set.count_within(i, eps);
            digamma(nx as f64 + 1.) + digamma(ny as f64 + 1.)
        })
        .collect::<Vec<_>>()
        .iter()
        .sum::<f64>();

    digamma(n as f64) + digamma(k as f64) - marginals / n as f64
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use rand_xoshiro::Xoshiro256PlusPlus;

    /// Standard bivariate normal samples with correlation `rho`.
    fn correlated(n: usize, rho: f64, seed: u64) -> (Array2<f64>, Array2<f64>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let normal = Normal::new(0., 1.).unwrap();
        let mut x = Array2::zeros((n, 1));
        let mut y = Array2::zeros((n, 1));
        for i in 0..n {
            let a = normal.sample(&mut rng);
            let b = normal.sample(&mut rng);
            x[[i, 0]] = a;
            y[[i, 0]] = rho * a + (1. - rho * rho).sqrt() * b;
        }
        (x, y)
    }

    #[test]
    fn gaussian_mutual_information() {
        // I = -ln(1 - rho^2) / 2.
        let (x, y) = correlated(3000, 0.8, 1);
        let mi = ksg(&x.view(), &y.view(), 3);
        assert!((mi - 0.5108).abs() < 0.05, "mi = {}", mi);
    }

    #[test]
    fn independent_variables() {
        let (x, y) = correlated(4000, 0., 2);
        let mi = ksg(&x.view(), &y.view(), 5);
        assert!(mi.abs() < 0.04, "mi = {}", mi);
    }

    #[test]
    fn prepared_samples_are_scale_free() {
        let (x, y) = correlated(1000, 0.6, 3);
        let estimate = |x: &Array2<f64>, y: &Array2<f64>| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
            let x = prepare(&x.view(), &mut rng);
            let y = prepare(&y.view(), &mut rng);
            ksg(&x.view(), &y.view(), 5)
        };
        let a = estimate(&x, &y);
        let b = estimate(&(&x * 1000.), &(&y * 0.01));
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn prepare_scales_and_jitters() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let values = array![[1.], [1.], [3.], [3.]];
        let prepared = prepare(&values.view(), &mut rng);
        // Population std is 1: only jitter is added.
        assert!((prepared[[2, 0]] - 3.).abs() < 1e-8);
        assert_ne!(prepared[[0, 0]], prepared[[1, 0]]);
    }
}
