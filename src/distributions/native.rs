//! Native samplers, backed by `rand_distr`.
use rand::distributions::{Bernoulli, Uniform, WeightedIndex};
use rand::Rng;
use rand_distr::{self as rd, Distribution};
use statrs::distribution::{ContinuousCDF, Normal as NormalCdf};

use super::{Dist, ParamFault};

/// Draws values of a `Dist`, always as `f64`.
///
/// A draw that cannot be produced returns NaN; the caller treats it as a
/// failed sample.
#[derive(Debug, Clone)]
pub enum NativeSampler {
    Bernoulli(Bernoulli),
    Beta(rd::Beta<f64>),
    // Beta-distributed success probability, then a binomial draw.
    BetaBinomial { p: rd::Beta<f64>, n: u64 },
    Binomial(rd::Binomial),
    Cauchy(rd::Cauchy<f64>),
    DiscreteUniform(Uniform<i64>),
    Exponential(rd::Exp<f64>),
    Gamma(rd::Gamma<f64>),
    // `rand_distr` counts failures; the catalog counts trials.
    Geometric(rd::Geometric),
    Laplace { mu: f64, b: f64 },
    Normal(rd::Normal<f64>),
    Poisson(rd::Poisson<f64>),
    StudentT { t: rd::StudentT<f64>, mu: f64, sigma: f64 },
    // Inverse-CDF sampling restricted to [cdf(lower), cdf(upper)].
    TruncatedNormal { normal: NormalCdf, lo: f64, hi: f64, lower: f64, upper: f64 },
    Uniform(Uniform<f64>),
    Categorical(WeightedIndex<f64>),
    Constant(f64),
}

fn fault<E: std::fmt::Display>(param: &'static str) -> impl Fn(E) -> ParamFault {
    move |e| ParamFault { param, reason: e.to_string() }
}

impl NativeSampler {
    pub fn new(dist: &Dist) -> Result<NativeSampler, ParamFault> {
        let sampler = match *dist {
            Dist::Bernoulli { p } =>
                NativeSampler::Bernoulli(Bernoulli::new(p).map_err(fault("p"))?),
            Dist::Beta { alpha, beta } =>
                NativeSampler::Beta(rd::Beta::new(alpha, beta).map_err(fault("alpha"))?),
            Dist::BetaBinomial { n, alpha, beta } => NativeSampler::BetaBinomial {
                p: rd::Beta::new(alpha, beta).map_err(fault("alpha"))?,
                n,
            },
            Dist::Binomial { n, p } =>
                NativeSampler::Binomial(rd::Binomial::new(n, p).map_err(fault("p"))?),
            Dist::Cauchy { alpha, beta } =>
                NativeSampler::Cauchy(rd::Cauchy::new(alpha, beta).map_err(fault("beta"))?),
            Dist::DiscreteUniform { lower, upper } =>
                NativeSampler::DiscreteUniform(Uniform::new_inclusive(lower, upper)),
            Dist::Exponential { lam } =>
                NativeSampler::Exponential(rd::Exp::new(lam).map_err(fault("lam"))?),
            Dist::Gamma { alpha, beta } =>
                NativeSampler::Gamma(rd::Gamma::new(alpha, 1. / beta).map_err(fault("beta"))?),
            Dist::Geometric { p } =>
                NativeSampler::Geometric(rd::Geometric::new(p).map_err(fault("p"))?),
            Dist::Laplace { mu, b } => NativeSampler::Laplace { mu, b },
            Dist::Normal { mu, std } =>
                NativeSampler::Normal(rd::Normal::new(mu, std).map_err(fault("std"))?),
            Dist::Poisson { mu } =>
                NativeSampler::Poisson(rd::Poisson::new(mu).map_err(fault("mu"))?),
            Dist::StudentT { nu, mu, sigma } => NativeSampler::StudentT {
                t: rd::StudentT::new(nu).map_err(fault("nu"))?,
                mu,
                sigma,
            },
            Dist::TruncatedNormal { mu, sigma, lower, upper } => {
                let normal = NormalCdf::new(mu, sigma).map_err(fault("sigma"))?;
                NativeSampler::TruncatedNormal {
                    lo: normal.cdf(lower),
                    hi: normal.cdf(upper),
                    normal,
                    lower,
                    upper,
                }
            },
            Dist::Uniform { lower, upper } => NativeSampler::Uniform(Uniform::new(lower, upper)),
            Dist::Categorical { ref p } =>
                NativeSampler::Categorical(WeightedIndex::new(p).map_err(fault("p"))?),
            Dist::Constant { val } => NativeSampler::Constant(val),
        };
        Ok(sampler)
    }
}

impl Distribution<f64> for NativeSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            NativeSampler::Bernoulli(d) => if d.sample(rng) { 1. } else { 0. },
            NativeSampler::Beta(d) => d.sample(rng),
            NativeSampler::BetaBinomial { p, n } => {
                match rd::Binomial::new(*n, p.sample(rng)) {
                    Ok(d) => d.sample(rng) as f64,
                    Err(_) => f64::NAN,
                }
            },
            NativeSampler::Binomial(d) => d.sample(rng) as f64,
            NativeSampler::Cauchy(d) => d.sample(rng),
            NativeSampler::DiscreteUniform(d) => d.sample(rng) as f64,
            NativeSampler::Exponential(d) => d.sample(rng),
            NativeSampler::Gamma(d) => d.sample(rng),
            NativeSampler::Geometric(d) => (d.sample(rng) + 1) as f64,
            NativeSampler::Laplace { mu, b } => {
                // Inverse CDF on u in (-1/2, 1/2).
                let u: f64 = rng.gen::<f64>() - 0.5;
                mu - b * u.signum() * (1. - 2. * u.abs()).ln()
            },
            NativeSampler::Normal(d) => d.sample(rng),
            NativeSampler::Poisson(d) => Distribution::<f64>::sample(d, rng),
            NativeSampler::StudentT { t, mu, sigma } => mu + sigma * t.sample(rng),
            NativeSampler::TruncatedNormal { normal, lo, hi, lower, upper } => {
                let u = lo + (hi - lo) * rng.gen::<f64>();
                normal.inverse_cdf(u).max(*lower).min(*upper)
            },
            NativeSampler::Uniform(d) => d.sample(rng),
            NativeSampler::Categorical(d) => d.sample(rng) as f64,
            NativeSampler::Constant(val) => *val,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use crate::distributions::DistKind;

    fn draws(kind: DistKind, values: &[f64], n: usize) -> Vec<f64> {
        let sampler = Dist::build(kind, values, None).unwrap().sampler().unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        (0..n).map(|_| sampler.sample(&mut rng)).collect()
    }

    fn mean(v: &[f64]) -> f64 {
        v.iter().sum::<f64>() / v.len() as f64
    }

    #[test]
    fn samples_stay_in_support() {
        let cases = vec![
            (DistKind::Geometric, vec![0.4]),
            (DistKind::DiscreteUniform, vec![-3., 3.]),
            (DistKind::BetaBinomial, vec![8., 2., 2.]),
            (DistKind::TruncatedNormal, vec![0., 5., -1., 2.]),
            (DistKind::Bernoulli, vec![0.7]),
            (DistKind::Poisson, vec![4.]),
        ];
        for (kind, values) in cases {
            let support = Dist::build(kind, &values, None).unwrap().support();
            for x in draws(kind, &values, 2000) {
                assert!(support.contains(x), "{:?}: {} outside support", kind, x);
            }
        }
    }

    #[test]
    fn sample_means() {
        let m = mean(&draws(DistKind::Geometric, &[0.25], 20000));
        assert!((m - 4.).abs() < 0.2, "geometric mean {}", m);

        let m = mean(&draws(DistKind::Laplace, &[2., 1.], 20000));
        assert!((m - 2.).abs() < 0.05, "laplace mean {}", m);

        // Gamma with rate 2: mean alpha/beta.
        let m = mean(&draws(DistKind::Gamma, &[3., 2.], 20000));
        assert!((m - 1.5).abs() < 0.05, "gamma mean {}", m);

        let m = mean(&draws(DistKind::StudentT, &[5., -3., 0.5], 20000));
        assert!((m + 3.).abs() < 0.05, "student-t mean {}", m);
    }

    #[test]
    fn categorical_and_constant() {
        let sampler = Dist::build(DistKind::Categorical, &[0.], Some(&[0., 1., 0.]))
                          .unwrap()
                          .sampler()
                          .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!((0..100).all(|_| sampler.sample(&mut rng) == 1.));

        assert!(draws(DistKind::Constant, &[2.5], 10).iter().all(|x| *x == 2.5));
    }
}
