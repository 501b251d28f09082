//! Search for the attacker belief under which a program leaks the most.
//!
//! Beliefs are split by distribution family: every combination of one
//! family per generator is searched on its own, on a `rayon` thread pool
//! of `cores` threads. A search draws a few random beliefs, then climbs
//! from the best of them with a pattern search: each parameter is moved
//! up and down by a step, the first move raising the leakage is taken,
//! and the step is halved after a sweep without improvement. Once the
//! step is below `min_step`, the search restarts from a fresh random
//! belief, until the budget is spent. Moves that break a parameter
//! constraint or the coverage policy are skipped and do not count
//! against the budget.
//!
//! Each combination owns its RNG, seeded from the search seed and jumped
//! ahead once per combination, so results do not depend on scheduling.
use itertools::Itertools;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::coverage::Ranges;
use super::generators::{declare, param_values, Candidate, ScalarGenerator, MAX_P, MIN_P,
                        MIN_POS};
use super::{measure, AttackerOutcome};
use crate::distributions::{Dist, DistKind};
use crate::error::{Error, InferenceError, InsufficientCoverageError};
use crate::inference::InferenceConfig;
use crate::measures::LeakageQuery;
use crate::program::Program;

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Random beliefs drawn before climbing.
    pub initial: usize,
    /// Leakage evaluations per combination, random ones included.
    pub evaluations: usize,
    /// First step: a fraction of the range width for locations, of the
    /// value for positive parameters, of 1/2 for probabilities.
    pub initial_step: f64,
    /// Climbing stops once the step falls below it.
    pub min_step: f64,
    /// Threads searching combinations.
    pub cores: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig {
            initial: 8,
            evaluations: 60,
            initial_step: 0.25,
            min_step: 1e-3,
            cores: rayon::current_num_threads(),
            seed: 0,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |msg: &str| Err(InferenceError::InvalidConfig(msg.to_owned()));
        if self.initial == 0 {
            return invalid("at least one initial belief is required");
        }
        if self.evaluations < self.initial {
            return invalid("evaluations must cover the initial beliefs");
        }
        if !(self.min_step > 0. && self.min_step <= self.initial_step
             && self.initial_step <= 1.) {
            return invalid("steps must satisfy 0 < min_step <= initial_step <= 1");
        }
        if self.cores == 0 {
            return invalid("cores must be positive");
        }
        Ok(())
    }
}

/// Best belief found for one combination of families.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationOutcome {
    /// One family per generator.
    pub kinds: Vec<DistKind>,
    pub best: AttackerOutcome,
    /// Leakage of every evaluated belief, in evaluation order.
    pub scores: Vec<f64>,
}

impl CombinationOutcome {
    pub fn evaluations(&self) -> usize {
        self.scores.len()
    }
}

/// Outcome of a search, one entry per combination of families.
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub combinations: Vec<CombinationOutcome>,
}

impl Search {
    /// The combination whose best belief leaks the most (the first one,
    /// on ties).
    pub fn strongest(&self) -> Option<&CombinationOutcome> {
        let mut best: Option<&CombinationOutcome> = None;
        for c in &self.combinations {
            match best {
                Some(b) if b.best.score() >= c.best.score() => {},
                _ => best = Some(c),
            }
        }
        best
    }
}

// How a parameter moves.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Location,
    Point,
    Positive,
    Count,
    Probability,
}

fn steps(kind: DistKind) -> &'static [Step] {
    use self::Step::*;
    match kind {
        DistKind::Bernoulli | DistKind::Geometric => &[Probability],
        DistKind::Binomial => &[Count, Probability],
        DistKind::BetaBinomial => &[Count, Positive, Positive],
        DistKind::Poisson | DistKind::Exponential => &[Positive],
        DistKind::DiscreteUniform => &[Point, Point],
        DistKind::Normal | DistKind::Laplace | DistKind::Cauchy => &[Location, Positive],
        DistKind::Uniform => &[Location, Location],
        DistKind::TruncatedNormal => &[Location, Positive, Location, Location],
        DistKind::StudentT => &[Positive, Location, Positive],
        DistKind::Beta | DistKind::Gamma => &[Positive, Positive],
        DistKind::Categorical | DistKind::Constant => &[],
    }
}

fn shift(value: f64, step: Step, h: f64, up: bool, r: &Ranges) -> f64 {
    let sign = if up { 1. } else { -1. };
    let factor = if up { 1. + h } else { 1. / (1. + h) };
    match step {
        Step::Location => (value + sign * h * r.width()).max(r.lower).min(r.upper),
        Step::Point => {
            let moved = (value + sign * (h * r.width()).max(1.)).round();
            moved.max(r.lower.ceil()).min(r.upper.floor())
        },
        Step::Positive => (value * factor).max(MIN_POS),
        Step::Count => {
            let moved = (value * factor).round();
            let moved = if up { moved.max(value + 1.) } else { moved.min(value - 1.) };
            moved.max(1.).min(r.upper.floor().max(1.))
        },
        Step::Probability => (value + sign * h * 0.5).max(MIN_P).min(MAX_P),
    }
}

// Moves parameter `p` of generator `g`'s distribution; None if the move
// is a no-op or lands on an invalid or insufficiently covering belief.
fn propose(generators: &[ScalarGenerator], current: &[Dist], g: usize, p: usize, up: bool,
           h: f64) -> Option<Vec<Dist>> {
    let generator = &generators[g];
    let kind = current[g].kind();
    let step = *steps(kind).get(p)?;
    let mut values = param_values(&current[g]);
    let moved = shift(values[p], step, h, up, &generator.ranges());
    if moved == values[p] {
        return None;
    }
    values[p] = moved;
    let dist = Dist::build(kind, &values, None).ok()?;
    if generator.coverage(&dist) < generator.policy().minimum_coverage {
        return None;
    }
    let mut proposal = current.to_vec();
    proposal[g] = dist;
    Some(proposal)
}

fn evaluate<F>(generators: &[ScalarGenerator], dists: &[Dist], build: &F,
               inference: &InferenceConfig, query: &LeakageQuery)
        -> Result<AttackerOutcome, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> {
    let variables = generators.iter().zip(dists)
                              .map(|(g, d)| declare(g.name(), d, 1))
                              .collect::<Result<Vec<_>, _>>()?;
    let coverage = generators.iter().zip(dists)
                             .map(|(g, d)| g.coverage(d))
                             .min()
                             .unwrap_or(0);
    measure(Candidate { variables, coverage }, build, inference, query)
}

// A belief, and the leakage measured under it.
type Belief = (Vec<Dist>, AttackerOutcome);

// Evaluates a random belief of the given kinds.
fn random_point<F>(generators: &[ScalarGenerator], kinds: &[DistKind],
                   rng: &mut Xoshiro256PlusPlus, scores: &mut Vec<f64>, build: &F,
                   inference: &InferenceConfig, query: &LeakageQuery)
        -> Result<Result<Belief, InsufficientCoverageError>, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> {
    let drawn = generators.iter().zip(kinds)
                          .map(|(g, k)| g.draw_kind(*k, rng).map(|(dist, _)| dist))
                          .collect::<Result<Vec<_>, _>>();
    let dists = match drawn {
        Ok(dists) => dists,
        Err(e) => return Ok(Err(e)),
    };
    let outcome = evaluate(generators, &dists, build, inference, query)?;
    scores.push(outcome.score());
    Ok(Ok((dists, outcome)))
}

// Pattern search from `point`, until the step falls below the minimum
// or the budget is spent.
fn climb<F>(generators: &[ScalarGenerator], mut point: Belief, scores: &mut Vec<f64>,
            build: &F, config: &SearchConfig, inference: &InferenceConfig,
            query: &LeakageQuery) -> Result<Belief, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> {
    let kinds = point.0.iter().map(|d| d.kind()).collect::<Vec<_>>();
    let moves = kinds.iter().enumerate()
                     .flat_map(|(g, k)| (0..steps(*k).len()).map(move |p| (g, p)))
                     .cartesian_product(vec![true, false])
                     .collect::<Vec<_>>();
    let mut h = config.initial_step;
    while scores.len() < config.evaluations && h >= config.min_step {
        let mut improved = false;
        for &((g, p), up) in &moves {
            if scores.len() >= config.evaluations {
                break;
            }
            let proposal = match propose(generators, &point.0, g, p, up, h) {
                Some(proposal) => proposal,
                None => continue,
            };
            let outcome = evaluate(generators, &proposal, build, inference, query)?;
            scores.push(outcome.score());
            if outcome.score() > point.1.score() {
                debug!(?kinds, score = outcome.score(), step = h, "belief improved");
                point = (proposal, outcome);
                improved = true;
                break;
            }
        }
        if !improved {
            h /= 2.;
        }
    }
    Ok(point)
}

fn search_combination<F>(generators: &[ScalarGenerator], kinds: &[DistKind],
                         rng: &mut Xoshiro256PlusPlus, build: &F, config: &SearchConfig,
                         inference: &InferenceConfig, query: &LeakageQuery)
        -> Result<CombinationOutcome, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> {
    let mut scores = Vec::with_capacity(config.evaluations);
    let mut start: Option<Belief> = None;
    let mut failure = None;
    for _ in 0..config.initial {
        match random_point(generators, kinds, rng, &mut scores, build, inference, query)? {
            Ok(point) => if start.as_ref().map_or(true, |s| point.1.score() > s.1.score()) {
                start = Some(point);
            },
            Err(e) => failure = Some(e),
        }
    }
    let mut point = match (start, failure) {
        (Some(start), _) => start,
        (None, Some(e)) => return Err(e.into()),
        (None, None) => return Err(InferenceError::InvalidConfig(
            "no initial belief was drawn".to_owned()).into()),
    };

    let mut best = point.1.clone();
    while scores.len() < config.evaluations {
        point = climb(generators, point, &mut scores, build, config, inference, query)?;
        if point.1.score() > best.score() {
            best = point.1.clone();
        }
        if scores.len() >= config.evaluations {
            break;
        }
        // Stuck: restart from a fresh random belief.
        point = match random_point(generators, kinds, rng, &mut scores, build, inference,
                                   query)? {
            Ok(point) => point,
            Err(_) => break,
        };
        debug!(?kinds, score = point.1.score(), "search restarted");
        if point.1.score() > best.score() {
            best = point.1.clone();
        }
    }
    Ok(CombinationOutcome { kinds: kinds.to_vec(), best, scores })
}

/// RNG of combination `i`: the seeded generator, jumped `i` times.
fn combination_rng(seed: u64, i: usize) -> Xoshiro256PlusPlus {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..i {
        rng.jump();
    }
    rng
}

/// Searches, for every combination of one reachable family per
/// generator, the belief under which the program leaks the most.
///
/// `build` turns a candidate belief into a program, measured as in
/// `analyze()`. The first error stops the search.
pub fn search<F>(generators: &[ScalarGenerator], build: F, config: &SearchConfig,
                 inference: &InferenceConfig, query: &LeakageQuery)
        -> Result<Search, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> + Sync {
    config.validate()?;
    if generators.is_empty() {
        return Err(InferenceError::InvalidConfig(
            "at least one generator is required".to_owned()).into());
    }
    let combinations = generators.iter()
                                 .map(|g| g.reachable_kinds())
                                 .multi_cartesian_product()
                                 .collect::<Vec<_>>();
    info!(generators = generators.len(), combinations = combinations.len(),
          budget = config.evaluations, "searching attacker beliefs");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.cores.min(combinations.len()).max(1))
        .build()
        .map_err(|e| InferenceError::ThreadPool(e.to_string()))?;
    let combinations = pool.install(|| {
        combinations.par_iter().enumerate()
            .map(|(i, kinds)| {
                let mut rng = combination_rng(config.seed, i);
                let outcome = search_combination(generators, kinds, &mut rng, &build, config,
                                                 inference, query)?;
                info!(?kinds, score = outcome.best.score(),
                      evaluations = outcome.evaluations(), "combination searched");
                Ok(outcome)
            })
            .collect::<Result<Vec<_>, Error>>()
    })?;
    Ok(Search { combinations })
}
