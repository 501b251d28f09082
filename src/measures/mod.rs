//! Leakage measures: how much the outputs of a program reveal about
//! each of its secrets.
//!
//! The main measure is the mutual information I(secret; output), which
//! is estimated from samples with one of three estimators, chosen from
//! whether each side is discrete or continuous:
//!
//! - **continuous-continuous**: Kraskov-Stögbauer-Grassberger k-NN
//!   estimator (`ksg`), on features scaled to unit variance;
//! - **discrete-discrete**: plug-in entropies of the empirical
//!   distributions (`discrete`);
//! - **mixed**: Ross' k-NN estimator (`mixed`).
//!
//! Estimates are never negative, and exactly 0 when either side is
//! constant. `leakage()` runs a query over a posterior trace and returns
//! a `LeakageReport`; `Measure::MinEntropy` replaces the mutual
//! information with the min-entropy leakage of `security_measures`.
//!
//! # Examples
//!
//! ```
//! use ndarray::Array;
//! use privug::measures::{mutual_information, EstimatorParams, Samples};
//!
//! let x = Array::from_shape_fn((400, 1), |(i, _)| (i % 4) as f64);
//! let secret = Samples::new(x.clone(), true);
//! let output = Samples::new(x, true);
//!
//! let mi = mutual_information(&secret, &output, &EstimatorParams::default()).unwrap();
//! assert!((mi - 2.).abs() < 1e-9);
//! ```
pub mod convergence;
pub mod discrete;
pub mod ksg;
pub mod mixed;
pub mod neighbors;

pub use self::convergence::{leakage_curve, ConvergenceChecker, CurvePoint, LeakageCurve};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ndarray::prelude::*;
use ndarray::{aview1, concatenate};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{InsufficientSamplesError, LeakageError};
use crate::inference::PosteriorTrace;
use crate::program::split_index;
use crate::security_measures::Vulnerability;
use crate::utils::{has_integer_support, is_constant, rows_to_ids};

/// Units of information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    Nats,
    Bits,
}

impl Units {
    /// Converts a quantity in nats.
    pub fn convert(self, nats: f64) -> f64 {
        match self {
            Units::Nats => nats,
            Units::Bits => nats / std::f64::consts::LN_2,
        }
    }
}

/// Mutual information estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Estimator {
    /// Chosen from whether secret and output are discrete.
    Auto,
    Continuous,
    Discrete,
    Mixed,
}

impl Estimator {
    /// The estimator to use for samples of the given kinds.
    pub fn resolve(self, secret_discrete: bool, output_discrete: bool) -> Estimator {
        match self {
            Estimator::Auto => match (secret_discrete, output_discrete) {
                (true, true) => Estimator::Discrete,
                (false, false) => Estimator::Continuous,
                _ => Estimator::Mixed,
            },
            forced => forced,
        }
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Estimator::Auto => "auto",
            Estimator::Continuous => "continuous",
            Estimator::Discrete => "discrete",
            Estimator::Mixed => "mixed",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Estimator {
    type Err = LeakageError;

    fn from_str(s: &str) -> Result<Estimator, LeakageError> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Estimator::Auto),
            "continuous" | "ksg" => Ok(Estimator::Continuous),
            "discrete" => Ok(Estimator::Discrete),
            "mixed" => Ok(Estimator::Mixed),
            other => Err(LeakageError::InvalidParams(format!("unknown estimator `{}`", other))),
        }
    }
}

/// What a leakage query measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measure {
    MutualInformation,
    /// Min-entropy leakage of the Bayes vulnerability.
    MinEntropy,
}

/// Parameters of the estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    /// Neighbors for the k-NN estimators.
    pub n_neigh: usize,
    pub units: Units,
    /// Fewer samples than this are rejected.
    pub min_samples: usize,
    pub estimator: Estimator,
    /// Seed of the noise added to continuous samples.
    pub seed: u64,
}

impl Default for EstimatorParams {
    fn default() -> EstimatorParams {
        EstimatorParams {
            n_neigh: 20,
            units: Units::Bits,
            min_samples: 100,
            estimator: Estimator::Auto,
            seed: 0,
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), LeakageError> {
        if self.n_neigh == 0 {
            return Err(LeakageError::InvalidParams("n_neigh must be at least 1".into()));
        }
        Ok(())
    }
}

/// Smallest number of samples accepted with `params`.
pub fn min_samples_for(params: &EstimatorParams) -> usize {
    params.min_samples.max(params.n_neigh + 1)
}

/// Samples of a (possibly vector) random variable, one per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub values: Array2<f64>,
    pub discrete: bool,
}

impl Samples {
    pub fn new(values: Array2<f64>, discrete: bool) -> Samples {
        Samples { values, discrete }
    }

    /// Scalar samples.
    pub fn from_vec(values: Vec<f64>, discrete: bool) -> Samples {
        let n = values.len();
        Samples {
            values: Array::from_shape_vec((n, 1), values)
                          .unwrap_or_else(|_| Array2::zeros((n, 1))),
            discrete,
        }
    }

    /// Samples that are discrete if all their values are integers.
    pub fn detect(values: Array2<f64>) -> Samples {
        let discrete = has_integer_support(&values.view());
        Samples { values, discrete }
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// The first `n` samples.
    pub fn prefix(&self, n: usize) -> Samples {
        Samples {
            values: self.values.slice(s![..n.min(self.len()), ..]).to_owned(),
            discrete: self.discrete,
        }
    }

    fn ids(&self) -> Vec<usize> {
        rows_to_ids(self.values.view(), None).0.into_raw_vec()
    }
}

fn check_sizes(secret: usize, output: usize, params: &EstimatorParams)
        -> Result<(), LeakageError> {
    if secret != output {
        return Err(LeakageError::LengthMismatch { secret, output });
    }
    let required = min_samples_for(params);
    if secret < required {
        return Err(InsufficientSamplesError { available: secret, required }.into());
    }
    Ok(())
}

/// Estimates the mutual information between two index-aligned sets of
/// samples, in the units of `params`.
///
/// The result is never negative, and is exactly 0 if either side is
/// constant.
pub fn mutual_information(secret: &Samples, output: &Samples, params: &EstimatorParams)
        -> Result<f64, LeakageError> {
    params.validate()?;
    check_sizes(secret.len(), output.len(), params)?;
    Ok(estimate(secret, output, params).0)
}

// Assumes sizes were checked.
fn estimate(secret: &Samples, output: &Samples, params: &EstimatorParams)
        -> (f64, Estimator) {
    let estimator = params.estimator.resolve(secret.discrete, output.discrete);
    if is_constant(&secret.values.view()) || is_constant(&output.values.view()) {
        return (0., estimator);
    }
    if params.estimator != Estimator::Auto {
        let natural = Estimator::Auto.resolve(secret.discrete, output.discrete);
        if natural != estimator {
            warn!(%estimator, %natural, "forcing an estimator that does not match the samples");
        }
    }

    let k = params.n_neigh;
    let nats = match estimator {
        Estimator::Discrete => discrete::plug_in(&secret.ids(), &output.ids()),
        Estimator::Continuous => {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
            let x = ksg::prepare(&secret.values.view(), &mut rng);
            let y = ksg::prepare(&output.values.view(), &mut rng);
            ksg::ksg(&x.view(), &y.view(), k)
        },
        // Auto never resolves to itself.
        Estimator::Mixed | Estimator::Auto => {
            let (continuous, labels) = if output.discrete && !secret.discrete {
                (secret, output)
            } else {
                (output, secret)
            };
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(params.seed);
            let c = ksg::prepare(&continuous.values.view(), &mut rng);
            mixed::ross(&c.view(), &labels.ids(), k)
        },
    };
    (params.units.convert(nats.max(0.)), estimator)
}

/// A leakage query over a posterior trace.
///
/// Variables are selected by name; `"name[i]"` selects the `i`-th
/// element of a vector variable. All the outputs are joined into a
/// single observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageQuery {
    pub secrets: Vec<String>,
    pub outputs: Vec<String>,
    pub params: EstimatorParams,
    pub measure: Measure,
}

impl LeakageQuery {
    pub fn new<S: AsRef<str>, O: AsRef<str>>(secrets: &[S], outputs: &[O]) -> LeakageQuery {
        LeakageQuery {
            secrets: secrets.iter().map(|s| s.as_ref().to_owned()).collect(),
            outputs: outputs.iter().map(|s| s.as_ref().to_owned()).collect(),
            params: EstimatorParams::default(),
            measure: Measure::MutualInformation,
        }
    }

    pub fn params(mut self, params: EstimatorParams) -> LeakageQuery {
        self.params = params;
        self
    }

    pub fn measure(mut self, measure: Measure) -> LeakageQuery {
        self.measure = measure;
        self
    }
}

/// Leakage about one secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub secret: String,
    pub score: f64,
    /// Estimator actually used.
    pub estimator: Estimator,
}

/// Result of a leakage query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakageReport {
    /// In declaration order of the secrets.
    pub entries: Vec<ReportEntry>,
    pub outputs: Vec<String>,
    pub sample_size: usize,
    pub params: EstimatorParams,
    pub measure: Measure,
}

impl LeakageReport {
    /// A report with the given scores and default metadata.
    pub fn from_scores<I>(scores: I) -> LeakageReport
            where I: IntoIterator<Item = (String, f64)> {
        LeakageReport {
            entries: scores.into_iter()
                           .map(|(secret, score)| ReportEntry { secret, score,
                                                                estimator: Estimator::Auto })
                           .collect(),
            outputs: Vec::new(),
            sample_size: 0,
            params: EstimatorParams::default(),
            measure: Measure::MutualInformation,
        }
    }

    /// The secret that leaks the most, and its score. Ties go to the
    /// first one.
    pub fn highest_leakage(&self) -> Option<(&str, f64)> {
        let mut best: Option<&ReportEntry> = None;
        for e in &self.entries {
            match best {
                Some(b) if b.score >= e.score => {},
                _ => best = Some(e),
            }
        }
        best.map(|e| (e.secret.as_str(), e.score))
    }

    pub fn score(&self, secret: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.secret == secret).map(|e| e.score)
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        self.entries.iter().map(|e| (e.secret.clone(), e.score)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs a leakage query over a trace.
pub fn leakage(trace: &PosteriorTrace, query: &LeakageQuery)
        -> Result<LeakageReport, LeakageError> {
    if query.secrets.is_empty() || query.outputs.is_empty() {
        return Err(LeakageError::EmptyQuery);
    }
    let params = &query.params;
    params.validate()?;

    let mut columns = Vec::with_capacity(query.outputs.len());
    let mut discrete = true;
    for selector in &query.outputs {
        let (values, d) = trace.samples(selector)
                               .ok_or_else(|| LeakageError::UnknownVariable(selector.clone()))?;
        discrete &= d;
        columns.push(values);
    }
    let views = columns.iter().map(|c| c.view()).collect::<Vec<_>>();
    let output = Samples::new(concatenate(Axis(1), &views)
                                  .map_err(|e| LeakageError::InvalidParams(e.to_string()))?,
                              discrete);

    // Secrets are reported in declaration order.
    let mut secrets = Vec::with_capacity(query.secrets.len());
    for selector in &query.secrets {
        let unknown = || LeakageError::UnknownVariable(selector.clone());
        let (name, element) = split_index(selector).ok_or_else(unknown)?;
        let position = trace.position(name).ok_or_else(unknown)?;
        let (values, d) = trace.samples(selector).ok_or_else(unknown)?;
        let reachable = trace.variables()[position].reachable;
        secrets.push(((position, element.unwrap_or(0)), selector, Samples::new(values, d),
                      reachable));
    }
    secrets.sort_by_key(|s| s.0);

    let sample_size = output.len();
    let mut entries = Vec::with_capacity(secrets.len());
    for (_, selector, secret, reachable) in secrets {
        check_sizes(secret.len(), sample_size, params)?;
        let (score, estimator) = match query.measure {
            Measure::MutualInformation if !reachable => {
                (0., params.estimator.resolve(secret.discrete, output.discrete))
            },
            Measure::MutualInformation => estimate(&secret, &output, params),
            Measure::MinEntropy => {
                if !secret.discrete || !output.discrete {
                    warn!(secret = selector.as_str(),
                          "min-entropy leakage of continuous samples");
                }
                let v = Vulnerability::estimate(&aview1(&secret.ids()),
                                                &aview1(&output.ids()));
                (v.min_entropy_leakage(params.units), Estimator::Discrete)
            },
        };
        debug!(secret = selector.as_str(), score, %estimator, "leakage");
        entries.push(ReportEntry { secret: selector.clone(), score, estimator });
    }

    let report = LeakageReport {
        entries,
        outputs: query.outputs.clone(),
        sample_size,
        params: *params,
        measure: query.measure,
    };
    if let Some((secret, score)) = report.highest_leakage() {
        info!(model = trace.model(), secret, score, "highest leakage");
    }
    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_distr::{Distribution, Normal};
    use crate::distributions::RandomVariable;
    use crate::inference::{infer, InferenceConfig};
    use crate::program::{Dataset, OutputSpec, Program, Value};
    use crate::transformer::compile;

    fn nats(estimator: Estimator) -> EstimatorParams {
        EstimatorParams { units: Units::Nats, estimator, ..EstimatorParams::default() }
    }

    #[test]
    fn estimator_resolution() {
        assert_eq!(Estimator::Auto.resolve(true, true), Estimator::Discrete);
        assert_eq!(Estimator::Auto.resolve(false, false), Estimator::Continuous);
        assert_eq!(Estimator::Auto.resolve(true, false), Estimator::Mixed);
        assert_eq!(Estimator::Auto.resolve(false, true), Estimator::Mixed);
        assert_eq!(Estimator::Discrete.resolve(false, false), Estimator::Discrete);
        assert_eq!("KSG".parse::<Estimator>().unwrap(), Estimator::Continuous);
        assert!("fancy".parse::<Estimator>().is_err());
    }

    #[test]
    fn identity_leaks_everything() {
        let x = Array::from_shape_fn((1000, 1), |(i, _)| (i % 8) as f64);
        let s = Samples::new(x.clone(), true);
        let bits = mutual_information(&s, &s, &EstimatorParams::default()).unwrap();
        assert!((bits - 3.).abs() < 1e-9);
        let n = mutual_information(&s, &s, &nats(Estimator::Auto)).unwrap();
        assert!((n - 8f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn constant_side_leaks_nothing() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let x = Samples::from_vec((0..500).map(|_| rng.gen::<f64>()).collect(), false);
        let c = Samples::from_vec(vec![4.; 500], false);
        for &e in &[Estimator::Auto, Estimator::Continuous, Estimator::Mixed] {
            assert_eq!(mutual_information(&x, &c, &nats(e)).unwrap(), 0.);
            assert_eq!(mutual_information(&c, &x, &nats(e)).unwrap(), 0.);
        }
    }

    #[test]
    fn noisy_xor() {
        // y = s XOR b, with P(b = 1) = 0.25:
        // I(s; y) = ln 2 - h(0.25) nats.
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let n = 20000;
        let s = (0..n).map(|_| rng.gen_range(0..2)).collect::<Vec<u32>>();
        let y = s.iter().map(|x| x ^ (rng.gen::<f64>() < 0.25) as u32).collect::<Vec<_>>();
        let secret = Samples::from_vec(s.iter().map(|x| *x as f64).collect(), true);
        let output = Samples::from_vec(y.iter().map(|x| *x as f64).collect(), true);

        let mi = mutual_information(&secret, &output, &nats(Estimator::Auto)).unwrap();
        let h = -(0.25f64 * 0.25f64.ln() + 0.75 * 0.75f64.ln());
        let expected = 2f64.ln() - h;
        assert!((mi - expected).abs() < 0.01, "mi = {}", mi);
        assert!(mi > 0. && mi < 2f64.ln());
    }

    #[test]
    fn estimate_is_stable_with_more_samples() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let s = (0..10000).map(|_| rng.gen_range(0..4) as f64).collect::<Vec<_>>();
        let y = s.iter().map(|x| (x / 2.).floor()).collect::<Vec<_>>();
        let secret = Samples::from_vec(s, true);
        let output = Samples::from_vec(y, true);
        let params = EstimatorParams::default();

        let small = mutual_information(&secret.prefix(1000), &output.prefix(1000),
                                       &params).unwrap();
        let large = mutual_information(&secret, &output, &params).unwrap();
        // One bit.
        assert!((small - 1.).abs() < 0.01);
        assert!((large - 1.).abs() < (small - 1.).abs() + 0.005);
    }

    #[test]
    fn mixed_samples() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let noise = Normal::new(0., 0.1).unwrap();
        let s = (0..2000).map(|_| rng.gen_range(0..2) as f64).collect::<Vec<_>>();
        let y = s.iter().map(|x| 10. * x + noise.sample(&mut rng)).collect::<Vec<_>>();
        let secret = Samples::from_vec(s, true);
        let output = Samples::from_vec(y, false);

        let mi = mutual_information(&secret, &output, &nats(Estimator::Auto)).unwrap();
        assert!((mi - 2f64.ln()).abs() < 0.03, "mi = {}", mi);
        // Symmetric.
        let rev = mutual_information(&output, &secret, &nats(Estimator::Auto)).unwrap();
        assert!((mi - rev).abs() < 1e-12);
    }

    #[test]
    fn structural_errors() {
        let a = Samples::from_vec(vec![0.; 200], true);
        let b = Samples::from_vec(vec![0.; 150], true);
        assert_eq!(mutual_information(&a, &b, &EstimatorParams::default()),
                   Err(LeakageError::LengthMismatch { secret: 200, output: 150 }));
        let params = EstimatorParams { n_neigh: 300, ..EstimatorParams::default() };
        assert_eq!(mutual_information(&a, &a, &params),
                   Err(LeakageError::InsufficientSamples(
                        InsufficientSamplesError { available: 200, required: 301 })));
        let params = EstimatorParams { n_neigh: 0, ..EstimatorParams::default() };
        assert!(matches!(mutual_information(&a, &a, &params),
                         Err(LeakageError::InvalidParams(_))));
    }

    #[test]
    fn highest_leakage_picks_first_maximum() {
        let report = LeakageReport::from_scores(vec![("A".to_owned(), 0.2),
                                                     ("B".to_owned(), 0.9),
                                                     ("C".to_owned(), 0.9)]);
        assert_eq!(report.highest_leakage(), Some(("B", 0.9)));
        assert_eq!(report.score("C"), Some(0.9));
        assert_eq!(report.as_map().len(), 3);
        assert_eq!(LeakageReport::from_scores(vec![]).highest_leakage(), None);

        let json = serde_json::to_string(&report).unwrap();
        let back: LeakageReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    fn trace() -> PosteriorTrace {
        // `low` leaks through the output, `high` does not.
        let dataset = Dataset::new()
            .secret(RandomVariable::discrete_uniform("high", 0., 3.).unwrap())
            .secret(RandomVariable::discrete_uniform("low", 0., 3.).unwrap())
            .public(RandomVariable::bernoulli("coin", 0.5).unwrap());
        let program = Program::new("parity", dataset, OutputSpec::int("out"),
            |v: &[Value]| {
                let low = v[1].scalar()? as i64;
                Ok(vec![Value::from(((low % 2) as f64 + v[2].scalar()?) % 2.)])
            });
        let graph = compile(&program).unwrap();
        let config = InferenceConfig { sample_count: 2000, chains: 2, seed: Some(5),
                                       ..InferenceConfig::default() };
        infer(&graph, &config).unwrap()
    }

    #[test]
    fn leakage_report() {
        let trace = trace();
        // Listed out of declaration order.
        let query = LeakageQuery::new(&["low", "high", "coin"], &["out"]);
        let report = leakage(&trace, &query).unwrap();

        let names = report.entries.iter().map(|e| e.secret.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["high", "low", "coin"]);
        assert_eq!(report.sample_size, 4000);
        assert!(report.entries.iter().all(|e| e.estimator == Estimator::Discrete));
        assert!(report.score("high").unwrap() < 0.01);
        // `out` is a fair coin independent of `low % 2`, and of `coin`.
        assert!(report.score("low").unwrap() < 0.01);

        // Both inputs together determine the output.
        let query = LeakageQuery::new(&["coin"], &["out", "low"]);
        let report = leakage(&trace, &query).unwrap();
        assert!((report.score("coin").unwrap() - 1.).abs() < 0.01);
        assert_eq!(report.outputs, vec!["out", "low"]);
    }

    #[test]
    fn min_entropy_report() {
        let trace = trace();
        let query = LeakageQuery::new(&["low"], &["out", "coin"])
                                 .measure(Measure::MinEntropy);
        let report = leakage(&trace, &query).unwrap();
        // Parity of `low` is revealed: the posterior vulnerability doubles.
        assert!((report.score("low").unwrap() - 1.).abs() < 0.05);
    }

    #[test]
    fn query_errors() {
        let trace = trace();
        assert_eq!(leakage(&trace, &LeakageQuery::new::<&str, &str>(&[], &["out"])),
                   Err(LeakageError::EmptyQuery));
        assert_eq!(leakage(&trace, &LeakageQuery::new(&["nope"], &["out"])),
                   Err(LeakageError::UnknownVariable("nope".to_owned())));
        assert_eq!(leakage(&trace, &LeakageQuery::new(&["low"], &["out[3]"])),
                   Err(LeakageError::UnknownVariable("out[3]".to_owned())));
        let params = EstimatorParams { min_samples: 10000, ..EstimatorParams::default() };
        assert!(matches!(leakage(&trace, &LeakageQuery::new(&["low"], &["out"]).params(params)),
                         Err(LeakageError::InsufficientSamples(_))));
    }

    fn pipeline_estimate(program: &Program, sample_count: usize, seed: u64,
                         secret: &str) -> f64 {
        let graph = compile(program).unwrap();
        let config = InferenceConfig { sample_count, chains: 1, cores: 1, seed: Some(seed),
                                       ..InferenceConfig::default() };
        let trace = infer(&graph, &config).unwrap();
        let report = leakage(&trace, &LeakageQuery::new(&[secret], &["out"])).unwrap();
        report.score(secret).unwrap()
    }

    #[test]
    fn revealed_secret_estimate_grows_with_samples() {
        let dataset = Dataset::new()
            .secret(RandomVariable::discrete_uniform("x", 0., 15.).unwrap());
        let program = Program::new("reveal", dataset, OutputSpec::int("out"),
                                   |v: &[Value]| Ok(vec![Value::from(v[0].scalar()?)]));

        let scores = [1000, 10_000, 100_000].iter()
            .map(|n| pipeline_estimate(&program, *n, 11, "x"))
            .collect::<Vec<_>>();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]), "scores = {:?}", scores);
        // Four bits.
        assert!((scores[2] - 4.).abs() < 0.01, "scores = {:?}", scores);
    }

    #[test]
    fn noisy_xor_error_shrinks_with_samples() {
        let dataset = Dataset::new()
            .secret(RandomVariable::bernoulli("s", 0.5).unwrap())
            .public(RandomVariable::bernoulli("noise", 0.25).unwrap());
        let program = Program::new("noisy_xor", dataset, OutputSpec::int("out"),
            |v: &[Value]| Ok(vec![Value::from((v[0].scalar()? + v[1].scalar()?) % 2.)]));
        let h = -(0.25f64 * 0.25f64.log2() + 0.75 * 0.75f64.log2());
        let expected = 1. - h;

        let errors = |n: usize| (0..10)
            .map(|seed| pipeline_estimate(&program, n, 100 + seed, "s"))
            .map(|mi| {
                assert!(mi > 0. && mi < 1., "mi = {}", mi);
                (mi - expected).abs()
            })
            .collect::<Vec<_>>();
        let small = errors(1000);
        let large = errors(20_000);
        let mean = |e: &[f64]| e.iter().sum::<f64>() / e.len() as f64;
        assert!(mean(&large) < mean(&small), "{:?} vs {:?}", large, small);
        assert!(large.iter().all(|e| *e < 0.03), "errors = {:?}", large);
    }
}
