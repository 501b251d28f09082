//! Catalog of the random variables a program can take as input.
//!
//! A `RandomVariable` is a declaration: a name, a distribution kind and
//! its parameters. Each parameter is either a literal or a reference to
//! another declared variable, which is how hyper-parameters are
//! expressed:
//!
//! ```
//! use privug::distributions::{RandomVariable, Param};
//!
//! let mu = RandomVariable::uniform("mu", 0., 10.).unwrap().hyper();
//! let x = RandomVariable::normal("x", Param::var("mu"), 1.).unwrap();
//!
//! assert!(mu.is_hyper_param());
//! assert_eq!(x.get_params()[0].1, Param::var("mu"));
//! ```
//!
//! Literal parameters are checked when the variable is declared;
//! referenced ones are checked whenever the model resolves them to a
//! concrete distribution (`Dist`).
pub mod analytic;
pub mod dist;
pub mod native;

pub use self::analytic::Analytic;
pub use self::dist::{Dist, ParamFault, Support};
pub use self::native::NativeSampler;

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::error::InvalidParameterError;

/// Distribution families known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DistKind {
    Bernoulli,
    Beta,
    BetaBinomial,
    Binomial,
    Cauchy,
    DiscreteUniform,
    Exponential,
    Gamma,
    Geometric,
    Laplace,
    Normal,
    Poisson,
    StudentT,
    TruncatedNormal,
    Uniform,
    Categorical,
    Constant,
}

impl DistKind {
    /// Parameter names, in declaration order.
    pub fn signature(self) -> &'static [&'static str] {
        use self::DistKind::*;
        match self {
            Bernoulli => &["p"],
            Beta => &["alpha", "beta"],
            BetaBinomial => &["n", "alpha", "beta"],
            Binomial => &["n", "p"],
            Cauchy => &["alpha", "beta"],
            DiscreteUniform => &["lower", "upper"],
            Exponential => &["lam"],
            Gamma => &["alpha", "beta"],
            Geometric => &["p"],
            Laplace => &["mu", "b"],
            Normal => &["mu", "std"],
            Poisson => &["mu"],
            StudentT => &["nu", "mu", "sigma"],
            TruncatedNormal => &["mu", "sigma", "lower", "upper"],
            Uniform => &["lower", "upper"],
            Categorical => &["p"],
            Constant => &["val"],
        }
    }

    /// Whether samples of this kind take integer values.
    pub fn is_discrete(self) -> bool {
        use self::DistKind::*;
        matches!(self,
                 Bernoulli | BetaBinomial | Binomial | DiscreteUniform
                 | Geometric | Poisson | Categorical | Constant)
    }
}

impl fmt::Display for DistKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Value bound to a distribution parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(f64),
    /// Probability vector (Categorical only).
    Probs(Vec<f64>),
    /// Reference to another variable, by name.
    Var(String),
}

impl Param {
    pub fn var(name: &str) -> Param {
        Param::Var(name.to_owned())
    }

    /// Name of the referenced variable, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Param::Var(name) => Some(name),
            _ => None,
        }
    }
}

impl From<f64> for Param {
    fn from(x: f64) -> Param {
        Param::Value(x)
    }
}

impl From<i32> for Param {
    fn from(x: i32) -> Param {
        Param::Value(f64::from(x))
    }
}

impl From<u32> for Param {
    fn from(x: u32) -> Param {
        Param::Value(f64::from(x))
    }
}

impl From<Vec<f64>> for Param {
    fn from(p: Vec<f64>) -> Param {
        Param::Probs(p)
    }
}

/// Number of i.i.d. draws a declaration stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Scalar,
    Vector(usize),
}

impl Shape {
    pub fn width(self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Vector(n) => n,
        }
    }
}

/// A declared input of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomVariable {
    name: String,
    kind: DistKind,
    params: Vec<(&'static str, Param)>,
    shape: Shape,
    is_hyper_param: bool,
}

macro_rules! constructor {
    ($(#[$doc:meta])* $fn_name:ident, $kind:ident, $($p:ident),+) => {
        $(#[$doc])*
        pub fn $fn_name(name: &str, $($p: impl Into<Param>),+)
                -> Result<RandomVariable, InvalidParameterError> {
            RandomVariable::new(name, DistKind::$kind, vec![$($p.into()),+])
        }
    };
}

impl RandomVariable {
    /// Declares a scalar variable, validating the parameters against the
    /// signature of `kind`.
    pub fn new(name: &str, kind: DistKind, values: Vec<Param>)
            -> Result<RandomVariable, InvalidParameterError> {
        let signature = kind.signature();
        let fault = |param: &str, reason: String| InvalidParameterError {
            variable: name.to_owned(),
            kind: kind.to_string(),
            param: param.to_owned(),
            reason,
        };

        if values.len() != signature.len() {
            return Err(fault("*", format!("expected {} parameters ({}), got {}",
                                          signature.len(), signature.join(", "),
                                          values.len())));
        }

        for (param, value) in signature.iter().zip(values.iter()) {
            match (value, kind == DistKind::Categorical) {
                (Param::Value(x), false) =>
                    dist::check_literal(kind, param, *x)
                        .map_err(|f| fault(f.param, f.reason))?,
                (Param::Var(_), false) | (Param::Probs(_), true) => {},
                (Param::Probs(_), false) =>
                    return Err(fault(param, "expected a scalar value".to_owned())),
                (Param::Value(_), true) =>
                    return Err(fault(param, "expected a probability vector".to_owned())),
                (Param::Var(_), true) =>
                    return Err(fault(param, "probabilities must be given as literals"
                                            .to_owned())),
            }
        }

        let rv = RandomVariable {
            name: name.to_owned(),
            kind,
            params: signature.iter().cloned().zip(values).collect(),
            shape: Shape::Scalar,
            is_hyper_param: false,
        };

        // Joint constraints (e.g., lower < upper) can only be checked
        // once every parameter is known.
        if let Some(values) = rv.literal_values() {
            Dist::build(kind, &values, rv.literal_probs())
                .map_err(|f| fault(f.param, f.reason))?;
        }
        Ok(rv)
    }

    constructor!(/// `Bernoulli(p)`.
                 bernoulli, Bernoulli, p);
    constructor!(/// `Beta(alpha, beta)`.
                 beta, Beta, alpha, beta);
    constructor!(/// `BetaBinomial(n, alpha, beta)`.
                 beta_binomial, BetaBinomial, n, alpha, beta);
    constructor!(/// `Binomial(n, p)`.
                 binomial, Binomial, n, p);
    constructor!(/// `Cauchy(alpha, beta)`, with location `alpha` and scale `beta`.
                 cauchy, Cauchy, alpha, beta);
    constructor!(/// `DiscreteUniform(lower, upper)`, both bounds included.
                 discrete_uniform, DiscreteUniform, lower, upper);
    constructor!(/// `Exponential(lam)`, `lam` being the rate.
                 exponential, Exponential, lam);
    constructor!(/// `Gamma(alpha, beta)`, `beta` being the rate.
                 gamma, Gamma, alpha, beta);
    constructor!(/// `Geometric(p)`: number of trials until the first success.
                 geometric, Geometric, p);
    constructor!(/// `Laplace(mu, b)`.
                 laplace, Laplace, mu, b);
    constructor!(/// `Normal(mu, std)`.
                 normal, Normal, mu, std);
    constructor!(/// `Poisson(mu)`.
                 poisson, Poisson, mu);
    constructor!(/// `StudentT(nu, mu, sigma)`.
                 student_t, StudentT, nu, mu, sigma);
    constructor!(/// `TruncatedNormal(mu, sigma, lower, upper)`.
                 truncated_normal, TruncatedNormal, mu, sigma, lower, upper);
    constructor!(/// `Uniform(lower, upper)`.
                 uniform, Uniform, lower, upper);
    constructor!(/// Point mass at `val`.
                 constant, Constant, val);

    /// `Categorical(p)`, over `{0, ..., p.len()-1}`. Weights are normalized.
    pub fn categorical(name: &str, p: Vec<f64>)
            -> Result<RandomVariable, InvalidParameterError> {
        RandomVariable::new(name, DistKind::Categorical, vec![Param::Probs(p)])
    }

    /// Turns the declaration into `n` i.i.d. draws.
    pub fn with_elements(mut self, n: usize) -> Result<RandomVariable, InvalidParameterError> {
        if n == 0 {
            return Err(InvalidParameterError {
                variable: self.name,
                kind: self.kind.to_string(),
                param: "num_elements".to_owned(),
                reason: "a vector needs at least one element".to_owned(),
            });
        }
        self.shape = Shape::Vector(n);
        Ok(self)
    }

    /// Marks the variable as a hyper-parameter: it parameterizes other
    /// variables and is not passed to the transformation.
    pub fn hyper(mut self) -> RandomVariable {
        self.is_hyper_param = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DistKind {
        self.kind
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn num_elements(&self) -> usize {
        self.shape.width()
    }

    pub fn is_hyper_param(&self) -> bool {
        self.is_hyper_param
    }

    pub fn is_discrete(&self) -> bool {
        self.kind.is_discrete()
    }

    /// Parameter bindings, exactly as declared.
    pub fn get_params(&self) -> &[(&'static str, Param)] {
        &self.params
    }

    /// Iterates over `(parameter, referenced variable)` pairs.
    pub fn references(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.params.iter().filter_map(|(p, v)| v.reference().map(|r| (*p, r)))
    }

    /// Domain of the variable. When some parameters are references the
    /// bounds are those of the family.
    pub fn support(&self) -> Support {
        match self.to_dist() {
            Some(Ok(dist)) => dist.support(),
            _ => Support::of_kind(self.kind),
        }
    }

    /// The concrete distribution, if no parameter is a reference.
    pub fn to_dist(&self) -> Option<Result<Dist, InvalidParameterError>> {
        let values = self.literal_values()?;
        Some(Dist::build(self.kind, &values, self.literal_probs())
                 .map_err(|f| f.at(&self.name, self.kind)))
    }

    /// Closed-form distribution for analytic queries, when the family has
    /// one and the parameters are literals.
    pub fn analytic(&self) -> Option<Analytic> {
        match self.to_dist()? {
            Ok(dist) => dist.analytic(),
            Err(_) => None,
        }
    }

    /// Native sampler, when the parameters are literals.
    pub fn sampler(&self) -> Option<Result<NativeSampler, InvalidParameterError>> {
        Some(self.to_dist()?.and_then(|d| d.sampler()
                                           .map_err(|f| f.at(&self.name, self.kind))))
    }

    // Scalar literals in signature order; `None` if any is a reference.
    fn literal_values(&self) -> Option<Vec<f64>> {
        self.params.iter()
            .map(|(_, v)| match v {
                Param::Value(x) => Some(*x),
                Param::Probs(_) => Some(0.),
                Param::Var(_) => None,
            })
            .collect()
    }

    fn literal_probs(&self) -> Option<&[f64]> {
        self.params.iter().find_map(|(_, v)| match v {
            Param::Probs(p) => Some(p.as_slice()),
            _ => None,
        })
    }
}
