//! Convergence diagnostics for MCMC chains.
//!
//! The engine only reports these; deciding whether a run converged is up
//! to the caller (a common rule of thumb is `r_hat < 1.01` and an
//! effective sample size of at least a few hundred).
use serde::{Deserialize, Serialize};

/// Split potential scale reduction factor (R-hat) of a scalar quantity.
///
/// Every chain is split in two halves, and the between-halves variance is
/// compared with the within-halves one. Values close to 1 suggest the
/// chains mix. Returns `None` with fewer than 4 draws per chain, or when
/// the halves are constant but disagree.
pub fn r_hat(chains: &[Vec<f64>]) -> Option<f64> {
    let n = chains.iter().map(|c| c.len()).min()? / 2;
    if n < 2 {
        return None;
    }
    let halves = chains.iter()
        .flat_map(|c| vec![&c[..n], &c[n..2 * n]])
        .collect::<Vec<_>>();
    let m = halves.len() as f64;
    let nf = n as f64;

    let means = halves.iter().map(|h| mean(h)).collect::<Vec<_>>();
    let grand_mean = mean(&means);
    let b = nf * means.iter().map(|x| (x - grand_mean).powi(2)).sum::<f64>() / (m - 1.);
    let w = halves.iter().zip(&means)
        .map(|(h, mu)| h.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (nf - 1.))
        .sum::<f64>() / m;

    if w == 0. {
        return if b == 0. { Some(1.) } else { None };
    }
    let var_plus = (nf - 1.) / nf * w + b / nf;
    Some((var_plus / w).sqrt())
}

/// Effective sample size of a scalar quantity over all chains.
///
/// Autocorrelations are averaged across chains and summed in pairs until
/// the first negative pair (Geyer's initial positive sequence).
pub fn ess(chains: &[Vec<f64>]) -> f64 {
    let n = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    let m = chains.len() as f64;
    let total = n as f64 * m;
    if n < 4 {
        return total;
    }

    let moments = chains.iter()
        .map(|c| {
            let mu = mean(&c[..n]);
            (mu, autocovariance(&c[..n], mu, 0))
        })
        .collect::<Vec<_>>();
    if moments.iter().any(|(_, var)| *var == 0.) {
        // Constant chains: draws are as good as independent.
        return total;
    }
    let rho = |lag: usize| chains.iter().zip(&moments)
        .map(|(c, (mu, var))| autocovariance(&c[..n], *mu, lag) / var)
        .sum::<f64>() / m;

    let mut sum = 0.;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = rho(lag) + rho(lag + 1);
        if pair < 0. {
            break;
        }
        sum += pair;
        lag += 2;
    }
    // rho[0] = 1 is counted once in tau = 1 + 2 sum_{t>0} rho[t].
    let tau = (2. * sum - 1.).max(1. / total.log10().max(1.));
    total / tau
}

fn autocovariance(x: &[f64], mu: f64, lag: usize) -> f64 {
    let n = x.len();
    x[..n - lag].iter().zip(&x[lag..])
                .map(|(a, b)| (a - mu) * (b - mu))
                .sum::<f64>() / n as f64
}

fn mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// A numerical problem met while sampling. Recorded, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerDivergenceWarning {
    pub chain: usize,
    /// Iteration, counting tuning ones.
    pub iteration: usize,
    pub variable: String,
    pub reason: String,
}

/// Per-chain summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDiagnostics {
    pub chain: usize,
    pub draws: usize,
    /// Accepted over proposed moves, after tuning.
    pub acceptance_rate: f64,
    pub divergences: usize,
    /// The chain stopped early because the time budget ran out.
    pub truncated: bool,
}

/// R-hat and ESS of each element of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDiagnostics {
    pub name: String,
    pub r_hat: Vec<Option<f64>>,
    pub ess: Vec<f64>,
}

/// Diagnostics attached to a `PosteriorTrace`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub variables: Vec<VariableDiagnostics>,
    pub chains: Vec<ChainDiagnostics>,
    /// The first warnings of each chain.
    pub warnings: Vec<SamplerDivergenceWarning>,
}

impl Diagnostics {
    pub fn variable(&self, name: &str) -> Option<&VariableDiagnostics> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn total_divergences(&self) -> usize {
        self.chains.iter().map(|c| c.divergences).sum()
    }

    pub fn has_divergences(&self) -> bool {
        self.total_divergences() > 0
    }

    /// Largest R-hat over all variables and elements.
    pub fn max_r_hat(&self) -> Option<f64> {
        self.variables.iter()
            .flat_map(|v| v.r_hat.iter().filter_map(|r| *r))
            .fold(None, |max, r| Some(max.map_or(r, |m: f64| m.max(r))))
    }

    /// Smallest ESS over all variables and elements.
    pub fn min_ess(&self) -> Option<f64> {
        self.variables.iter()
            .flat_map(|v| v.ess.iter().cloned())
            .fold(None, |min, e| Some(min.map_or(e, |m: f64| m.min(e))))
    }

    pub fn is_truncated(&self) -> bool {
        self.chains.iter().any(|c| c.truncated)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn white_noise(seed: u64, mu: f64, n: usize) -> Vec<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let normal = Normal::new(mu, 1.).unwrap();
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    #[test]
    fn r_hat_of_mixed_chains_is_one() {
        let chains = vec![white_noise(1, 0., 2000), white_noise(2, 0., 2000)];
        let r = r_hat(&chains).unwrap();
        assert!((r - 1.).abs() < 0.01, "r_hat = {}", r);
    }

    #[test]
    fn r_hat_detects_disagreement() {
        let chains = vec![white_noise(1, 0., 1000), white_noise(2, 5., 1000)];
        assert!(r_hat(&chains).unwrap() > 1.5);
        // A single chain drifting between two regimes.
        let mut drifting = white_noise(3, 0., 500);
        drifting.extend(white_noise(4, 5., 500));
        assert!(r_hat(&[drifting]).unwrap() > 1.5);
    }

    #[test]
    fn r_hat_edge_cases() {
        assert_eq!(r_hat(&[vec![1., 2., 3.]]), None);
        assert_eq!(r_hat(&[vec![2.; 10], vec![2.; 10]]), Some(1.));
        assert_eq!(r_hat(&[vec![2.; 10], vec![3.; 10]]), None);
    }

    #[test]
    fn ess_of_short_chains() {
        assert_eq!(ess(&[]), 0.);
        assert_eq!(ess(&[Vec::new()]), 0.);
        assert_eq!(ess(&[vec![1., 2., 3.]]), 3.);
        // Autocorrelations up to the last lag.
        assert_eq!(ess(&[vec![1., 2., 1., 2.]]), 4.);
    }

    #[test]
    fn ess_of_independent_draws() {
        let chains = vec![white_noise(5, 0., 4000)];
        let e = ess(&chains);
        assert!(e > 3000. && e < 5000., "ess = {}", e);
    }

    #[test]
    fn ess_of_correlated_draws() {
        // AR(1) with coefficient 0.9: ESS is about n (1 - 0.9) / (1 + 0.9).
        let noise = white_noise(6, 0., 20000);
        let mut x = vec![0.; noise.len()];
        for i in 1..x.len() {
            x[i] = 0.9 * x[i - 1] + noise[i];
        }
        let e = ess(&[x]);
        assert!(e > 500. && e < 1600., "ess = {}", e);
    }
}
