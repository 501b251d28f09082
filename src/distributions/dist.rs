//! Fully resolved distributions.
//!
//! `Dist` is what a `RandomVariable` becomes once every parameter has a
//! concrete value. It carries the capability set shared by all kinds:
//! parameter validation (`Dist::build`), log-density, CDF, a native
//! sampler and, when the family has one, a closed-form `Analytic`
//! distribution.
use std::f64;
use std::f64::consts::PI;
use float_cmp::approx_eq;
use statrs::function::beta::ln_beta;
use statrs::function::erf::erfc;
use statrs::function::factorial::ln_binomial;
use statrs::function::gamma::ln_gamma;

use super::{Analytic, DistKind, NativeSampler};
use crate::error::InvalidParameterError;

/// A parameter constraint violation, not yet attached to a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamFault {
    pub param: &'static str,
    pub reason: String,
}

impl ParamFault {
    fn new(param: &'static str, reason: &str) -> ParamFault {
        ParamFault { param, reason: reason.to_owned() }
    }

    /// Attaches the fault to variable `name`.
    pub fn at(self, name: &str, kind: DistKind) -> InvalidParameterError {
        InvalidParameterError {
            variable: name.to_owned(),
            kind: kind.to_string(),
            param: self.param.to_owned(),
            reason: self.reason,
        }
    }
}

/// Domain of a distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Support {
    pub lower: f64,
    pub upper: f64,
    pub discrete: bool,
}

impl Support {
    /// Widest domain a family can have, whatever its parameters.
    pub fn of_kind(kind: DistKind) -> Support {
        use self::DistKind::*;
        let inf = f64::INFINITY;
        let (lower, upper) = match kind {
            Bernoulli | Beta => (0., 1.),
            BetaBinomial | Binomial | Poisson | Categorical => (0., inf),
            Exponential | Gamma => (0., inf),
            Geometric => (1., inf),
            _ => (-inf, inf),
        };
        Support { lower, upper, discrete: kind.is_discrete() }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper && (!self.discrete || x.fract() == 0.)
    }
}

/// A distribution with concrete parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Dist {
    Bernoulli { p: f64 },
    Beta { alpha: f64, beta: f64 },
    BetaBinomial { n: u64, alpha: f64, beta: f64 },
    Binomial { n: u64, p: f64 },
    Cauchy { alpha: f64, beta: f64 },
    DiscreteUniform { lower: i64, upper: i64 },
    Exponential { lam: f64 },
    Gamma { alpha: f64, beta: f64 },
    Geometric { p: f64 },
    Laplace { mu: f64, b: f64 },
    Normal { mu: f64, std: f64 },
    Poisson { mu: f64 },
    StudentT { nu: f64, mu: f64, sigma: f64 },
    TruncatedNormal { mu: f64, sigma: f64, lower: f64, upper: f64 },
    Uniform { lower: f64, upper: f64 },
    /// Normalized weights.
    Categorical { p: Vec<f64> },
    Constant { val: f64 },
}

/// Checks the constraints a single literal must satisfy, independently of
/// the other parameters.
pub fn check_literal(kind: DistKind, param: &'static str, x: f64) -> Result<(), ParamFault> {
    use self::DistKind::*;

    if !x.is_finite() {
        return Err(ParamFault::new(param, "must be finite"));
    }
    match (kind, param) {
        (Bernoulli, "p") | (Binomial, "p") if !(0. ..=1.).contains(&x) =>
            Err(ParamFault::new(param, "must be in [0, 1]")),
        (Geometric, "p") if !(x > 0. && x <= 1.) =>
            Err(ParamFault::new(param, "must be in (0, 1]")),
        (Binomial, "n") | (BetaBinomial, "n") if x < 1. || x.fract() != 0. =>
            Err(ParamFault::new(param, "must be a positive integer")),
        (DiscreteUniform, _) if x.fract() != 0. =>
            Err(ParamFault::new(param, "must be an integer")),
        (Beta, _) | (BetaBinomial, "alpha") | (BetaBinomial, "beta") | (Cauchy, "beta")
        | (Exponential, _) | (Gamma, _) | (Laplace, "b") | (Normal, "std")
        | (Poisson, _) | (StudentT, "nu") | (StudentT, "sigma")
        | (TruncatedNormal, "sigma") if x <= 0. =>
            Err(ParamFault::new(param, "must be positive")),
        _ => Ok(()),
    }
}

/// Standard normal CDF.
pub(crate) fn phi(z: f64) -> f64 {
    0.5 * erfc(-z / f64::consts::SQRT_2)
}

// `k * ln(p)`, with `0 * ln(0) = 0`.
fn xlny(k: f64, p: f64) -> f64 {
    if k == 0. { 0. } else { k * p.ln() }
}

impl Dist {
    /// Builds a distribution of kind `kind` from parameter values given in
    /// signature order. `probs` is only read for Categorical.
    pub fn build(kind: DistKind, values: &[f64], probs: Option<&[f64]>)
            -> Result<Dist, ParamFault> {
        let signature = kind.signature();
        if values.len() != signature.len() {
            return Err(ParamFault::new("*", "wrong number of parameters"));
        }
        if kind != DistKind::Categorical {
            for (param, x) in signature.iter().zip(values) {
                check_literal(kind, param, *x)?;
            }
        }
        let v = |i: usize| values[i];

        let dist = match kind {
            DistKind::Bernoulli => Dist::Bernoulli { p: v(0) },
            DistKind::Beta => Dist::Beta { alpha: v(0), beta: v(1) },
            DistKind::BetaBinomial => Dist::BetaBinomial { n: v(0) as u64,
                                                           alpha: v(1), beta: v(2) },
            DistKind::Binomial => Dist::Binomial { n: v(0) as u64, p: v(1) },
            DistKind::Cauchy => Dist::Cauchy { alpha: v(0), beta: v(1) },
            DistKind::DiscreteUniform => {
                if v(0) > v(1) {
                    return Err(ParamFault::new("upper", "must not be smaller than lower"));
                }
                Dist::DiscreteUniform { lower: v(0) as i64, upper: v(1) as i64 }
            },
            DistKind::Exponential => Dist::Exponential { lam: v(0) },
            DistKind::Gamma => Dist::Gamma { alpha: v(0), beta: v(1) },
            DistKind::Geometric => Dist::Geometric { p: v(0) },
            DistKind::Laplace => Dist::Laplace { mu: v(0), b: v(1) },
            DistKind::Normal => Dist::Normal { mu: v(0), std: v(1) },
            DistKind::Poisson => Dist::Poisson { mu: v(0) },
            DistKind::StudentT => Dist::StudentT { nu: v(0), mu: v(1), sigma: v(2) },
            DistKind::TruncatedNormal => {
                let (mu, sigma, lower, upper) = (v(0), v(1), v(2), v(3));
                if lower >= upper {
                    return Err(ParamFault::new("upper", "must be greater than lower"));
                }
                let mass = phi((upper - mu) / sigma) - phi((lower - mu) / sigma);
                if mass <= 0. || !mass.is_finite() {
                    return Err(ParamFault::new("lower",
                                               "bounds carry no probability mass"));
                }
                Dist::TruncatedNormal { mu, sigma, lower, upper }
            },
            DistKind::Uniform => {
                if v(0) >= v(1) {
                    return Err(ParamFault::new("upper", "must be greater than lower"));
                }
                Dist::Uniform { lower: v(0), upper: v(1) }
            },
            DistKind::Categorical => {
                let p = probs.ok_or_else(|| ParamFault::new("p", "missing probabilities"))?;
                if p.is_empty() {
                    return Err(ParamFault::new("p", "must not be empty"));
                }
                if p.iter().any(|w| !w.is_finite() || *w < 0.) {
                    return Err(ParamFault::new("p", "weights must be finite and non-negative"));
                }
                let total: f64 = p.iter().sum();
                if total <= 0. {
                    return Err(ParamFault::new("p", "weights must have a positive sum"));
                }
                Dist::Categorical { p: p.iter().map(|w| w / total).collect() }
            },
            DistKind::Constant => Dist::Constant { val: v(0) },
        };
        Ok(dist)
    }

    pub fn kind(&self) -> DistKind {
        match self {
            Dist::Bernoulli { .. } => DistKind::Bernoulli,
            Dist::Beta { .. } => DistKind::Beta,
            Dist::BetaBinomial { .. } => DistKind::BetaBinomial,
            Dist::Binomial { .. } => DistKind::Binomial,
            Dist::Cauchy { .. } => DistKind::Cauchy,
            Dist::DiscreteUniform { .. } => DistKind::DiscreteUniform,
            Dist::Exponential { .. } => DistKind::Exponential,
            Dist::Gamma { .. } => DistKind::Gamma,
            Dist::Geometric { .. } => DistKind::Geometric,
            Dist::Laplace { .. } => DistKind::Laplace,
            Dist::Normal { .. } => DistKind::Normal,
            Dist::Poisson { .. } => DistKind::Poisson,
            Dist::StudentT { .. } => DistKind::StudentT,
            Dist::TruncatedNormal { .. } => DistKind::TruncatedNormal,
            Dist::Uniform { .. } => DistKind::Uniform,
            Dist::Categorical { .. } => DistKind::Categorical,
            Dist::Constant { .. } => DistKind::Constant,
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.kind().is_discrete()
    }

    pub fn support(&self) -> Support {
        let mut support = Support::of_kind(self.kind());
        let bounds = match *self {
            Dist::BetaBinomial { n, .. } | Dist::Binomial { n, .. } => Some((0., n as f64)),
            Dist::DiscreteUniform { lower, upper } => Some((lower as f64, upper as f64)),
            Dist::TruncatedNormal { lower, upper, .. }
            | Dist::Uniform { lower, upper } => Some((lower, upper)),
            Dist::Categorical { ref p } => Some((0., (p.len() - 1) as f64)),
            Dist::Constant { val } => Some((val, val)),
            _ => None,
        };
        if let Some((lower, upper)) = bounds {
            support.lower = lower;
            support.upper = upper;
        }
        support
    }

    /// Log-density (or log-mass, for discrete kinds) at `x`;
    /// `-inf` outside the support.
    pub fn ln_density(&self, x: f64) -> f64 {
        if x.is_nan() || !self.support().contains(x) {
            return f64::NEG_INFINITY;
        }
        match *self {
            Dist::Bernoulli { p } => if x == 1. { p.ln() } else { (1. - p).ln() },
            Dist::Beta { alpha, beta } =>
                xlny(alpha - 1., x) + xlny(beta - 1., 1. - x) - ln_beta(alpha, beta),
            Dist::BetaBinomial { n, alpha, beta } => {
                let k = x as u64;
                ln_binomial(n, k) + ln_beta(x + alpha, (n - k) as f64 + beta)
                    - ln_beta(alpha, beta)
            },
            Dist::Binomial { n, p } => {
                let k = x as u64;
                ln_binomial(n, k) + xlny(x, p) + xlny((n - k) as f64, 1. - p)
            },
            Dist::Cauchy { alpha, beta } => {
                let z = (x - alpha) / beta;
                -(PI * beta * (1. + z * z)).ln()
            },
            Dist::DiscreteUniform { lower, upper } => -((upper - lower + 1) as f64).ln(),
            Dist::Exponential { lam } => lam.ln() - lam * x,
            Dist::Gamma { alpha, beta } =>
                alpha * beta.ln() - ln_gamma(alpha) + xlny(alpha - 1., x) - beta * x,
            Dist::Geometric { p } => xlny(x - 1., 1. - p) + p.ln(),
            Dist::Laplace { mu, b } => -(2. * b).ln() - (x - mu).abs() / b,
            Dist::Normal { mu, std } => normal_ln_pdf(x, mu, std),
            Dist::Poisson { mu } => x * mu.ln() - mu - ln_gamma(x + 1.),
            Dist::StudentT { nu, mu, sigma } => {
                let z = (x - mu) / sigma;
                ln_gamma((nu + 1.) / 2.) - ln_gamma(nu / 2.) - 0.5 * (nu * PI).ln()
                    - sigma.ln() - (nu + 1.) / 2. * (1. + z * z / nu).ln()
            },
            Dist::TruncatedNormal { mu, sigma, lower, upper } => {
                let mass = phi((upper - mu) / sigma) - phi((lower - mu) / sigma);
                normal_ln_pdf(x, mu, sigma) - mass.ln()
            },
            Dist::Uniform { lower, upper } => -(upper - lower).ln(),
            Dist::Categorical { ref p } => p[x as usize].ln(),
            Dist::Constant { val } => if x == val { 0. } else { f64::NEG_INFINITY },
        }
    }

    /// P(X <= x).
    pub fn cdf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let support = self.support();
        if x < support.lower {
            return 0.;
        }
        if x >= support.upper {
            return 1.;
        }
        match *self {
            Dist::TruncatedNormal { mu, sigma, lower, upper } => {
                let lo = phi((lower - mu) / sigma);
                let mass = phi((upper - mu) / sigma) - lo;
                ((phi((x - mu) / sigma) - lo) / mass).max(0.).min(1.)
            },
            Dist::BetaBinomial { .. } => {
                (0..=x.floor() as u64).map(|k| self.ln_density(k as f64).exp())
                                      .sum::<f64>()
                                      .min(1.)
            },
            Dist::Constant { .. } => 1.,
            _ => match self.analytic() {
                Some(analytic) => analytic.cdf(x),
                None => f64::NAN,
            },
        }
    }

    /// P(lower <= X <= upper).
    pub fn mass(&self, lower: f64, upper: f64) -> f64 {
        if lower > upper {
            return 0.;
        }
        let m = if self.is_discrete() {
            self.cdf(upper.floor()) - self.cdf(lower.ceil() - 1.)
        } else {
            self.cdf(upper) - self.cdf(lower)
        };
        m.max(0.)
    }

    /// Smallest `x` with `cdf(x) >= q`, found by bisection.
    pub fn quantile(&self, q: f64) -> f64 {
        let support = self.support();
        if q <= 0. {
            return support.lower;
        }
        if q >= 1. {
            return support.upper;
        }

        let mut lo = support.lower;
        let mut hi = support.upper;
        if lo.is_infinite() {
            lo = -1.;
            while lo.is_finite() && self.cdf(lo) > q {
                lo *= 2.;
            }
        }
        if hi.is_infinite() {
            hi = lo.abs().max(1.);
            while hi.is_finite() && self.cdf(hi) < q {
                hi *= 2.;
            }
        }
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if approx_eq!(f64, lo, hi, ulps = 2) {
                break;
            }
            if self.cdf(mid) < q {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        if !self.is_discrete() {
            hi
        } else if self.cdf(hi.floor()) >= q {
            hi.floor()
        } else {
            hi.ceil()
        }
    }

    /// Native sampler for this distribution.
    pub fn sampler(&self) -> Result<NativeSampler, ParamFault> {
        NativeSampler::new(self)
    }

    /// Closed-form distribution, if the analytic backend has one for
    /// this kind.
    pub fn analytic(&self) -> Option<Analytic> {
        Analytic::new(self)
    }
}

fn normal_ln_pdf(x: f64, mu: f64, std: f64) -> f64 {
    let z = (x - mu) / std;
    -0.5 * z * z - std.ln() - 0.5 * (2. * PI).ln()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn dist(kind: DistKind, values: &[f64]) -> Dist {
        Dist::build(kind, values, None).unwrap()
    }

    #[test]
    fn build_checks_joint_constraints() {
        assert!(Dist::build(DistKind::DiscreteUniform, &[3., 2.], None).is_err());
        assert!(Dist::build(DistKind::DiscreteUniform, &[3., 3.], None).is_ok());
        assert!(Dist::build(DistKind::TruncatedNormal, &[0., 1., 2., 1.], None).is_err());
        // All the mass of N(0, 1) is far from [100, 101].
        assert!(Dist::build(DistKind::TruncatedNormal, &[0., 1., 100., 101.], None)
                    .is_err());
        assert!(Dist::build(DistKind::Normal, &[0.], None).is_err());

        let c = Dist::build(DistKind::Categorical, &[0.], Some(&[1., 3.])).unwrap();
        assert_eq!(c, Dist::Categorical { p: vec![0.25, 0.75] });
    }

    #[test]
    fn ln_density_outside_support() {
        assert_eq!(dist(DistKind::Uniform, &[0., 1.]).ln_density(1.5), f64::NEG_INFINITY);
        assert_eq!(dist(DistKind::Poisson, &[2.]).ln_density(1.5), f64::NEG_INFINITY);
        assert_eq!(dist(DistKind::Poisson, &[2.]).ln_density(-1.), f64::NEG_INFINITY);
        assert_eq!(dist(DistKind::Geometric, &[0.5]).ln_density(0.), f64::NEG_INFINITY);
        assert_eq!(dist(DistKind::Constant, &[4.]).ln_density(4.), 0.);
    }

    #[test]
    fn ln_density_agrees_with_analytic() {
        let cases = vec![
            (dist(DistKind::Normal, &[1., 2.]), vec![-3., 0., 1., 4.5]),
            (dist(DistKind::Beta, &[2., 5.]), vec![0.1, 0.5, 0.9]),
            (dist(DistKind::Cauchy, &[0., 2.]), vec![-10., 0., 3.]),
            (dist(DistKind::Exponential, &[1.5]), vec![0., 0.3, 7.]),
            (dist(DistKind::Gamma, &[3., 2.]), vec![0.1, 1., 5.]),
            (dist(DistKind::Laplace, &[1., 0.5]), vec![-1., 1., 2.]),
            (dist(DistKind::StudentT, &[4., 1., 2.]), vec![-2., 1., 8.]),
            (dist(DistKind::Uniform, &[-1., 3.]), vec![0., 2.]),
            (dist(DistKind::Bernoulli, &[0.3]), vec![0., 1.]),
            (dist(DistKind::Binomial, &[10., 0.3]), vec![0., 3., 10.]),
            (dist(DistKind::DiscreteUniform, &[2., 7.]), vec![2., 5., 7.]),
            (dist(DistKind::Geometric, &[0.2]), vec![1., 2., 10.]),
            (dist(DistKind::Poisson, &[3.5]), vec![0., 3., 12.]),
        ];
        for (d, xs) in cases {
            let a = d.analytic().unwrap();
            for x in xs {
                assert!(approx_eq!(f64, d.ln_density(x), a.ln_density(x), epsilon = 1e-9),
                        "{:?} at {}: {} vs {}", d, x, d.ln_density(x), a.ln_density(x));
            }
        }
    }

    #[test]
    fn beta_binomial_is_normalized() {
        let d = dist(DistKind::BetaBinomial, &[12., 2., 3.]);
        let total: f64 = (0..=12).map(|k| d.ln_density(k as f64).exp()).sum();
        assert!(approx_eq!(f64, total, 1., epsilon = 1e-9));
        assert_eq!(d.cdf(12.), 1.);
        // BetaBinomial(n, 1, 1) is uniform over {0, ..., n}.
        let flat = dist(DistKind::BetaBinomial, &[4., 1., 1.]);
        assert!(approx_eq!(f64, flat.ln_density(2.).exp(), 0.2, epsilon = 1e-12));
    }

    #[test]
    fn truncated_normal() {
        let d = dist(DistKind::TruncatedNormal, &[0., 1., 0., 10.]);
        // Half-normal: density doubles.
        let expected = 2. * (-0.5f64).exp() / (2. * PI).sqrt();
        assert!(approx_eq!(f64, d.ln_density(1.).exp(), expected, epsilon = 1e-12));
        assert!(approx_eq!(f64, d.cdf(0.), 0., epsilon = 1e-12));
        assert!(approx_eq!(f64, d.quantile(0.5), 0.6744897501960817, epsilon = 1e-6));
        assert_eq!(d.ln_density(-0.1), f64::NEG_INFINITY);
    }

    #[test]
    fn mass_and_quantiles() {
        let du = dist(DistKind::DiscreteUniform, &[0., 9.]);
        assert!(approx_eq!(f64, du.mass(2., 4.), 0.3, epsilon = 1e-12));
        assert!(approx_eq!(f64, du.mass(2.5, 4.5), 0.2, epsilon = 1e-12));
        assert_eq!(du.quantile(0.35), 3.);

        let n = dist(DistKind::Normal, &[10., 2.]);
        assert!(approx_eq!(f64, n.quantile(0.5), 10., epsilon = 1e-6));
        assert!(approx_eq!(f64, n.mass(8., 12.), 0.6826894921370859, epsilon = 1e-9));
    }
}
