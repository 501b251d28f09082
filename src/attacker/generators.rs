//! Generators of candidate attacker beliefs.
//!
//! A generator draws distributions of a few families, with parameters
//! bounded by the range the attacker believes the variable lives in.
//! Only candidates covering enough of that range are kept (see
//! `CoveragePolicy`).
//!
//! Generators are deterministic given their seed: `iter()` always
//! restarts the same sequence.
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

use super::coverage::{coverage, max_coverage, CoveragePolicy, Ranges};
use crate::distributions::{Dist, DistKind, Param, RandomVariable};
use crate::error::{Error, InsufficientCoverageError, InvalidParameterError};

/// Smallest value drawn for positive parameters.
pub(crate) const MIN_POS: f64 = 0.0999755859375;
/// Bounds of drawn probabilities.
pub(crate) const MIN_P: f64 = 0.001;
pub(crate) const MAX_P: f64 = 0.99;

/// Families drawn by integer generators.
pub const INT_KINDS: &[DistKind] = &[DistKind::Binomial, DistKind::Bernoulli,
                                     DistKind::Geometric, DistKind::BetaBinomial,
                                     DistKind::Poisson, DistKind::DiscreteUniform];
/// Families drawn by float generators.
pub const FLOAT_KINDS: &[DistKind] = &[DistKind::Normal, DistKind::Uniform,
                                       DistKind::TruncatedNormal, DistKind::Beta,
                                       DistKind::Exponential, DistKind::Laplace,
                                       DistKind::StudentT, DistKind::Cauchy,
                                       DistKind::Gamma];

/// One candidate belief: the variables it declares, and how many
/// points or bins of the range it covers (the least covered variable's).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub variables: Vec<RandomVariable>,
    pub coverage: usize,
}

/// Parameter values of `dist`, in signature order.
pub(crate) fn param_values(dist: &Dist) -> Vec<f64> {
    match *dist {
        Dist::Bernoulli { p } | Dist::Geometric { p } => vec![p],
        Dist::Beta { alpha, beta } | Dist::Gamma { alpha, beta }
        | Dist::Cauchy { alpha, beta } => vec![alpha, beta],
        Dist::BetaBinomial { n, alpha, beta } => vec![n as f64, alpha, beta],
        Dist::Binomial { n, p } => vec![n as f64, p],
        Dist::DiscreteUniform { lower, upper } => vec![lower as f64, upper as f64],
        Dist::Exponential { lam } => vec![lam],
        Dist::Laplace { mu, b } => vec![mu, b],
        Dist::Normal { mu, std } => vec![mu, std],
        Dist::Poisson { mu } => vec![mu],
        Dist::StudentT { nu, mu, sigma } => vec![nu, mu, sigma],
        Dist::TruncatedNormal { mu, sigma, lower, upper } => vec![mu, sigma, lower, upper],
        Dist::Uniform { lower, upper } => vec![lower, upper],
        Dist::Constant { val } => vec![val],
        Dist::Categorical { .. } => Vec::new(),
    }
}

/// Declares a variable distributed as `dist`.
pub(crate) fn declare(name: &str, dist: &Dist, elements: usize)
        -> Result<RandomVariable, InvalidParameterError> {
    let values = param_values(dist).into_iter().map(Param::Value).collect();
    let rv = RandomVariable::new(name, dist.kind(), values)?;
    if elements > 1 { rv.with_elements(elements) } else { Ok(rv) }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if hi > lo { rng.gen_range(lo..=hi) } else { lo }
}

fn integer<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    let (lo, hi) = (lo.ceil() as i64, hi.floor() as i64);
    if hi > lo { rng.gen_range(lo..=hi) as f64 } else { lo as f64 }
}

fn sorted_pair(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Draws the parameters of a `kind` distribution within `r`, or None
/// if the draw must be rejected.
fn draw_dist<R: Rng + ?Sized>(kind: DistKind, r: &Ranges, rng: &mut R) -> Option<Dist> {
    let (lo, hi) = (r.lower, r.upper);
    let spread = r.width().max(MIN_POS);
    let values = match kind {
        DistKind::Binomial => {
            let n = integer(rng, lo.max(1.), hi.max(1.));
            let p = uniform(rng, MIN_P, MAX_P);
            if !r.contains(n * p) {
                return None;
            }
            vec![n, p]
        },
        DistKind::Bernoulli => vec![uniform(rng, MIN_P, MAX_P)],
        DistKind::Geometric => {
            let p = uniform(rng, MIN_P, MAX_P);
            if !r.contains(1. / p) {
                return None;
            }
            vec![p]
        },
        DistKind::BetaBinomial => {
            let n = integer(rng, lo.max(1.), hi.max(1.));
            let alpha = uniform(rng, MIN_POS, 40.);
            let beta = uniform(rng, MIN_POS, 40.);
            if !r.contains(n * alpha / (alpha + beta)) {
                return None;
            }
            vec![n, alpha, beta]
        },
        DistKind::Poisson => vec![uniform(rng, lo.max(MIN_POS), hi)],
        DistKind::DiscreteUniform => {
            let (a, b) = sorted_pair(integer(rng, lo, hi), integer(rng, lo, hi));
            if a >= b {
                return None;
            }
            vec![a, b]
        },
        DistKind::Normal => vec![uniform(rng, lo, hi), uniform(rng, MIN_POS, spread)],
        DistKind::Uniform => {
            let (a, b) = sorted_pair(uniform(rng, lo, hi), uniform(rng, lo, hi));
            if a >= b {
                return None;
            }
            vec![a, b]
        },
        DistKind::TruncatedNormal => {
            let mu = uniform(rng, lo, hi);
            let sigma = uniform(rng, MIN_POS, spread);
            let (a, b) = sorted_pair(uniform(rng, lo, hi), uniform(rng, lo, hi));
            if a >= b {
                return None;
            }
            vec![mu, sigma, a, b]
        },
        DistKind::Beta => vec![uniform(rng, MIN_POS, 40.), uniform(rng, MIN_POS, 40.)],
        DistKind::Exponential => {
            let lam = uniform(rng, MIN_POS, 50.);
            if !r.contains(1. / lam) {
                return None;
            }
            vec![lam]
        },
        DistKind::Laplace => vec![uniform(rng, lo, hi), uniform(rng, MIN_POS, 50.)],
        DistKind::StudentT => vec![uniform(rng, MIN_POS, spread), uniform(rng, lo, hi),
                                   uniform(rng, MIN_POS, spread)],
        DistKind::Cauchy => vec![uniform(rng, lo, hi), uniform(rng, MIN_POS, 10.)],
        DistKind::Gamma => {
            let alpha = uniform(rng, MIN_POS, 40.);
            let beta = uniform(rng, MIN_POS, 40.);
            if !r.contains(alpha / beta) {
                return None;
            }
            vec![alpha, beta]
        },
        DistKind::Categorical | DistKind::Constant => return None,
    };
    Dist::build(kind, &values, None).ok()
}

/// Generates single-variable candidates (IntGenerator / FloatGenerator).
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarGenerator {
    name: String,
    discrete: bool,
    kinds: Vec<DistKind>,
    ranges: Ranges,
    policy: CoveragePolicy,
    // Continuous coverage bins hold equal mass under it.
    reference: Option<Dist>,
    seed: u64,
}

impl ScalarGenerator {
    /// Integer-valued candidates. Ranges must start at 0 or above, and
    /// hold at most `policy.max_points` integers.
    pub fn int(name: &str, ranges: Ranges, policy: CoveragePolicy)
            -> Result<ScalarGenerator, Error> {
        let fault = |reason: String| InvalidParameterError {
            variable: name.to_owned(),
            kind: "IntGenerator".to_owned(),
            param: "ranges".to_owned(),
            reason,
        };
        if ranges.lower < 0. {
            return Err(fault("integer ranges must start at 0 or above".to_owned()).into());
        }
        ranges.check_integer_count(&policy).map_err(|e| fault(e.reason))?;
        // A Bernoulli cannot cover ranges beyond {0, 1}.
        let kinds = INT_KINDS.iter()
                             .cloned()
                             .filter(|k| *k != DistKind::Bernoulli || ranges.upper <= 1.)
                             .collect();
        ScalarGenerator::build(name, true, kinds, ranges, policy)
    }

    /// Real-valued candidates.
    pub fn float(name: &str, ranges: Ranges, policy: CoveragePolicy)
            -> Result<ScalarGenerator, Error> {
        ScalarGenerator::build(name, false, FLOAT_KINDS.to_vec(), ranges, policy)
    }

    fn build(name: &str, discrete: bool, kinds: Vec<DistKind>, ranges: Ranges,
             policy: CoveragePolicy) -> Result<ScalarGenerator, Error> {
        let generator = ScalarGenerator {
            name: name.to_owned(),
            discrete,
            kinds,
            ranges,
            policy,
            reference: None,
            seed: 0,
        };
        generator.check_reachable()?;
        Ok(generator)
    }

    /// Restricts the families drawn.
    pub fn with_kinds(mut self, kinds: &[DistKind]) -> Result<ScalarGenerator, Error> {
        let supported = if self.discrete { INT_KINDS } else { FLOAT_KINDS };
        if let Some(k) = kinds.iter().find(|k| !supported.contains(k)) {
            return Err(InvalidParameterError {
                variable: self.name.clone(),
                kind: k.to_string(),
                param: "kinds".to_owned(),
                reason: format!("not supported by {} generators",
                                if self.discrete { "integer" } else { "float" }),
            }.into());
        }
        self.kinds = kinds.to_vec();
        self.check_reachable()?;
        Ok(self)
    }

    /// Measures the coverage of float candidates with bins of equal mass
    /// under `reference`, the attacker's rough belief about the variable.
    pub fn with_reference(mut self, reference: Dist) -> Result<ScalarGenerator, Error> {
        if self.discrete || reference.is_discrete() {
            return Err(InvalidParameterError {
                variable: self.name.clone(),
                kind: reference.kind().to_string(),
                param: "reference".to_owned(),
                reason: "references are continuous, for float generators".to_owned(),
            }.into());
        }
        self.reference = Some(reference);
        self.check_reachable()?;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> ScalarGenerator {
        self.seed = seed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinds(&self) -> &[DistKind] {
        &self.kinds
    }

    pub fn ranges(&self) -> Ranges {
        self.ranges
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete
    }

    pub fn policy(&self) -> CoveragePolicy {
        self.policy
    }

    pub fn reference(&self) -> Option<&Dist> {
        self.reference.as_ref()
    }

    /// Points or bins of the range `dist` covers.
    pub fn coverage(&self, dist: &Dist) -> usize {
        coverage(dist, &self.ranges, self.reference.as_ref(), &self.policy)
    }

    fn max_coverage(&self, kind: DistKind) -> usize {
        max_coverage(kind, &self.ranges, self.reference.as_ref(), &self.policy)
    }

    /// Kinds whose distributions could cover the policy's minimum.
    pub(crate) fn reachable_kinds(&self) -> Vec<DistKind> {
        self.kinds.iter()
                  .filter(|k| self.max_coverage(**k) >= self.policy.minimum_coverage)
                  .cloned()
                  .collect()
    }

    // Fails if no family could ever cover the policy's minimum.
    fn check_reachable(&self) -> Result<(), InsufficientCoverageError> {
        let best = self.kinds.iter().map(|k| self.max_coverage(*k)).max().unwrap_or(0);
        if best < self.policy.minimum_coverage {
            return Err(InsufficientCoverageError {
                generator: self.name.clone(),
                covered: best,
                required: self.policy.minimum_coverage,
            });
        }
        Ok(())
    }

    /// Draws an adequate distribution of any of the kinds, trying at
    /// most `max_attempts` times.
    pub(crate) fn draw<R: Rng + ?Sized>(&self, rng: &mut R)
            -> Result<(Dist, usize), InsufficientCoverageError> {
        self.draw_from(rng, |rng| self.kinds.choose(rng).cloned())
    }

    /// Like `draw`, for a single kind.
    pub(crate) fn draw_kind<R: Rng + ?Sized>(&self, kind: DistKind, rng: &mut R)
            -> Result<(Dist, usize), InsufficientCoverageError> {
        self.draw_from(rng, |_| Some(kind))
    }

    fn draw_from<R, K>(&self, rng: &mut R, mut pick: K)
            -> Result<(Dist, usize), InsufficientCoverageError>
            where R: Rng + ?Sized, K: FnMut(&mut R) -> Option<DistKind> {
        let mut best = 0;
        for _ in 0..self.policy.max_attempts {
            let kind = match pick(rng) {
                Some(kind) => kind,
                None => break,
            };
            let dist = match draw_dist(kind, &self.ranges, rng) {
                Some(dist) => dist,
                None => continue,
            };
            let covered = self.coverage(&dist);
            if covered >= self.policy.minimum_coverage {
                return Ok((dist, covered));
            }
            debug!(generator = self.name.as_str(), ?dist, covered, "rejected candidate");
            best = best.max(covered);
        }
        Err(InsufficientCoverageError {
            generator: self.name.clone(),
            covered: best,
            required: self.policy.minimum_coverage,
        })
    }

    /// Candidates, from the start of the sequence.
    pub fn iter(&self) -> Candidates<'_> {
        Candidates::new(Source::Scalar(self), self.seed)
    }
}

/// Length of generated lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Fixed(usize),
    /// Drawn uniformly, both bounds included.
    Between(usize, usize),
}

/// How list elements are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One variable with `len` i.i.d. elements.
    Shared,
    /// One variable per element, `name0`, `name1`, ...
    PerElement,
}

/// Generates list candidates (IntList / FloatList).
#[derive(Debug, Clone, PartialEq)]
pub struct ListGenerator {
    element: ScalarGenerator,
    length: Length,
    layout: Layout,
}

impl ListGenerator {
    pub fn int_list(name: &str, ranges: Ranges, length: Length, layout: Layout,
                    policy: CoveragePolicy) -> Result<ListGenerator, Error> {
        ListGenerator::new(ScalarGenerator::int(name, ranges, policy)?, length, layout)
    }

    pub fn float_list(name: &str, ranges: Ranges, length: Length, layout: Layout,
                      policy: CoveragePolicy) -> Result<ListGenerator, Error> {
        ListGenerator::new(ScalarGenerator::float(name, ranges, policy)?, length, layout)
    }

    /// Lists whose elements are drawn by `element`.
    pub fn new(element: ScalarGenerator, length: Length, layout: Layout)
            -> Result<ListGenerator, Error> {
        let valid = match length {
            Length::Fixed(n) => n > 0,
            Length::Between(a, b) => a > 0 && a <= b,
        };
        if !valid {
            return Err(InvalidParameterError {
                variable: element.name.clone(),
                kind: if element.discrete { "IntList" } else { "FloatList" }.to_owned(),
                param: "length".to_owned(),
                reason: "lists need a positive length, with increasing bounds".to_owned(),
            }.into());
        }
        Ok(ListGenerator { element, length, layout })
    }

    pub fn with_seed(mut self, seed: u64) -> ListGenerator {
        self.element.seed = seed;
        self
    }

    pub fn iter(&self) -> Candidates<'_> {
        Candidates::new(Source::List(self), self.element.seed)
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Candidate, Error> {
        let len = match self.length {
            Length::Fixed(n) => n,
            Length::Between(a, b) => rng.gen_range(a..=b),
        };
        let name = &self.element.name;
        match self.layout {
            Layout::Shared => {
                let (dist, covered) = self.element.draw(rng)?;
                Ok(Candidate { variables: vec![declare(name, &dist, len)?],
                               coverage: covered })
            },
            Layout::PerElement => {
                let mut variables = Vec::with_capacity(len);
                let mut least = usize::MAX;
                for i in 0..len {
                    let (dist, covered) = self.element.draw(rng)?;
                    variables.push(declare(&format!("{}{}", name, i), &dist, 1)?);
                    least = least.min(covered);
                }
                Ok(Candidate { variables, coverage: least })
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    Scalar(&'a ScalarGenerator),
    List(&'a ListGenerator),
}

/// Lazy sequence of candidates. It ends after the first error.
#[derive(Debug, Clone)]
pub struct Candidates<'a> {
    source: Source<'a>,
    rng: Xoshiro256PlusPlus,
    failed: bool,
}

impl<'a> Candidates<'a> {
    fn new(source: Source<'a>, seed: u64) -> Candidates<'a> {
        Candidates {
            source,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            failed: false,
        }
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = Result<Candidate, Error>;

    fn next(&mut self) -> Option<Result<Candidate, Error>> {
        if self.failed {
            return None;
        }
        let candidate = match self.source {
            Source::Scalar(g) => g.draw(&mut self.rng)
                .map_err(Error::from)
                .and_then(|(dist, coverage)| Ok(Candidate {
                    variables: vec![declare(&g.name, &dist, 1)?],
                    coverage,
                })),
            Source::List(g) => g.draw(&mut self.rng),
        };
        self.failed = candidate.is_err();
        Some(candidate)
    }
}
