//! Closed-form distributions, backed by `statrs`.
use statrs::distribution::{self as sd, Continuous, ContinuousCDF, Discrete, DiscreteCDF};
use statrs::statistics::Distribution as Moments;

use super::Dist;

/// A distribution with closed-form density, CDF and moments.
///
/// BetaBinomial, TruncatedNormal and Constant have no counterpart here;
/// `Dist` evaluates them directly.
#[derive(Debug, Clone)]
pub enum Analytic {
    Bernoulli(sd::Bernoulli),
    Beta(sd::Beta),
    Binomial(sd::Binomial),
    Cauchy(sd::Cauchy),
    DiscreteUniform(sd::DiscreteUniform),
    Exponential(sd::Exp),
    Gamma(sd::Gamma),
    Geometric(sd::Geometric),
    Laplace(sd::Laplace),
    Normal(sd::Normal),
    Poisson(sd::Poisson),
    StudentT(sd::StudentsT),
    Uniform(sd::Uniform),
    Categorical(sd::Categorical),
}

// Expands `$body` once per variant, binding the inner distribution to `$d`.
macro_rules! continuous {
    ($self:expr, $d:ident => $body:expr, $otherwise:expr) => {
        match $self {
            Analytic::Beta($d) => $body,
            Analytic::Cauchy($d) => $body,
            Analytic::Exponential($d) => $body,
            Analytic::Gamma($d) => $body,
            Analytic::Laplace($d) => $body,
            Analytic::Normal($d) => $body,
            Analytic::StudentT($d) => $body,
            Analytic::Uniform($d) => $body,
            _ => $otherwise,
        }
    };
}

macro_rules! counting {
    ($self:expr, $d:ident => $body:expr, $otherwise:expr) => {
        match $self {
            Analytic::Bernoulli($d) => $body,
            Analytic::Binomial($d) => $body,
            Analytic::Geometric($d) => $body,
            Analytic::Poisson($d) => $body,
            Analytic::Categorical($d) => $body,
            _ => $otherwise,
        }
    };
}

impl Analytic {
    /// `None` for kinds without a closed form, or if the backend rejects
    /// the parameters.
    pub fn new(dist: &Dist) -> Option<Analytic> {
        let analytic = match *dist {
            Dist::Bernoulli { p } => Analytic::Bernoulli(sd::Bernoulli::new(p).ok()?),
            Dist::Beta { alpha, beta } => Analytic::Beta(sd::Beta::new(alpha, beta).ok()?),
            Dist::Binomial { n, p } => Analytic::Binomial(sd::Binomial::new(p, n).ok()?),
            Dist::Cauchy { alpha, beta } =>
                Analytic::Cauchy(sd::Cauchy::new(alpha, beta).ok()?),
            Dist::DiscreteUniform { lower, upper } =>
                Analytic::DiscreteUniform(sd::DiscreteUniform::new(lower, upper).ok()?),
            Dist::Exponential { lam } => Analytic::Exponential(sd::Exp::new(lam).ok()?),
            Dist::Gamma { alpha, beta } => Analytic::Gamma(sd::Gamma::new(alpha, beta).ok()?),
            Dist::Geometric { p } => Analytic::Geometric(sd::Geometric::new(p).ok()?),
            Dist::Laplace { mu, b } => Analytic::Laplace(sd::Laplace::new(mu, b).ok()?),
            Dist::Normal { mu, std } => Analytic::Normal(sd::Normal::new(mu, std).ok()?),
            Dist::Poisson { mu } => Analytic::Poisson(sd::Poisson::new(mu).ok()?),
            Dist::StudentT { nu, mu, sigma } =>
                Analytic::StudentT(sd::StudentsT::new(mu, sigma, nu).ok()?),
            Dist::Uniform { lower, upper } =>
                Analytic::Uniform(sd::Uniform::new(lower, upper).ok()?),
            Dist::Categorical { ref p } =>
                Analytic::Categorical(sd::Categorical::new(p).ok()?),
            Dist::BetaBinomial { .. }
            | Dist::TruncatedNormal { .. }
            | Dist::Constant { .. } => return None,
        };
        Some(analytic)
    }

    pub fn is_discrete(&self) -> bool {
        counting!(self, _d => true, matches!(self, Analytic::DiscreteUniform(_)))
    }

    pub fn ln_density(&self, x: f64) -> f64 {
        if let Analytic::DiscreteUniform(d) = self {
            return if x.fract() == 0. { d.ln_pmf(x as i64) } else { f64::NEG_INFINITY };
        }
        if self.is_discrete() {
            if x < 0. || x.fract() != 0. {
                return f64::NEG_INFINITY;
            }
            return counting!(self, d => d.ln_pmf(x as u64), f64::NEG_INFINITY);
        }
        continuous!(self, d => d.ln_pdf(x), f64::NEG_INFINITY)
    }

    pub fn cdf(&self, x: f64) -> f64 {
        if let Analytic::DiscreteUniform(d) = self {
            return d.cdf(x.floor() as i64);
        }
        if self.is_discrete() {
            if x < 0. {
                return 0.;
            }
            return counting!(self, d => d.cdf(x.floor() as u64), f64::NAN);
        }
        continuous!(self, d => d.cdf(x), f64::NAN)
    }

    pub fn mean(&self) -> Option<f64> {
        match self {
            Analytic::DiscreteUniform(d) => d.mean(),
            _ => counting!(self, d => d.mean(), continuous!(self, d => d.mean(), None)),
        }
    }

    pub fn variance(&self) -> Option<f64> {
        match self {
            Analytic::DiscreteUniform(d) => d.variance(),
            _ => counting!(self, d => d.variance(),
                           continuous!(self, d => d.variance(), None)),
        }
    }

    /// Entropy in nats.
    pub fn entropy(&self) -> Option<f64> {
        match self {
            Analytic::DiscreteUniform(d) => d.entropy(),
            _ => counting!(self, d => d.entropy(),
                           continuous!(self, d => d.entropy(), None)),
        }
    }
}
