//! Attacker models.
//!
//! An attacker's background knowledge is modeled as a belief about the
//! distribution of the inputs. Generators synthesize many plausible
//! beliefs (`Candidate`s); `analyze()` measures the leakage under each of
//! them, so that one can see which prior assumptions make a program leak
//! the most. `search()` looks for the most leaking belief of each
//! combination of distribution families, climbing from random ones.
//!
//! # Examples
//!
//! ```
//! use privug::attacker::{AttackerDataset, CoveragePolicy, Ranges, ScalarGenerator};
//!
//! let ranges = Ranges::new(0., 120.).unwrap();
//! let generator = ScalarGenerator::int("age", ranges, CoveragePolicy::default())
//!                                 .unwrap()
//!                                 .with_seed(1);
//! let candidate = generator.iter().next().unwrap().unwrap();
//! assert!(candidate.coverage >= 5);
//!
//! let dataset = AttackerDataset::draw(&candidate.variables, 50, 7).unwrap();
//! assert_eq!(dataset.records.dim(), (50, 1));
//! ```
pub mod coverage;
pub mod generators;
pub mod search;

pub use self::coverage::{CoveragePolicy, Ranges};
pub use self::generators::{Candidate, Candidates, Layout, Length, ListGenerator,
                           ScalarGenerator};
pub use self::search::{search, CombinationOutcome, Search, SearchConfig};

use ndarray::prelude::*;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;

use crate::distributions::RandomVariable;
use crate::error::{Error, InvalidParameterError};
use crate::inference::{infer, InferenceConfig};
use crate::measures::{leakage, LeakageQuery, LeakageReport, Samples};
use crate::program::Program;
use crate::transformer::compile;

/// Synthetic records drawn from an attacker's belief.
///
/// Each variable contributes one column, named after it, or one column
/// per element (`name[i]`) for vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackerDataset {
    pub columns: Vec<String>,
    pub discrete: Vec<bool>,
    pub records: Array2<f64>,
}

impl AttackerDataset {
    /// Draws `records` independent records. Every parameter of the
    /// variables must be a literal.
    pub fn draw(variables: &[RandomVariable], records: usize, seed: u64)
            -> Result<AttackerDataset, InvalidParameterError> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut columns = Vec::new();
        let mut discrete = Vec::new();
        let mut values: Vec<Array1<f64>> = Vec::new();

        for rv in variables {
            let sampler = match rv.sampler() {
                Some(sampler) => sampler?,
                None => return Err(InvalidParameterError {
                    variable: rv.name().to_owned(),
                    kind: rv.kind().to_string(),
                    param: "*".to_owned(),
                    reason: "attacker datasets need literal parameters".to_owned(),
                }),
            };
            let width = rv.num_elements();
            for e in 0..width {
                columns.push(if width > 1 { format!("{}[{}]", rv.name(), e) }
                             else { rv.name().to_owned() });
                discrete.push(rv.is_discrete());
            }
            let draws = Array::from_shape_simple_fn(records * width,
                                                    || sampler.sample(&mut rng));
            for e in 0..width {
                values.push(draws.slice(s![e..;width]).to_owned());
            }
        }

        let mut matrix = Array2::zeros((records, values.len()));
        for (j, column) in values.iter().enumerate() {
            matrix.column_mut(j).assign(column);
        }
        Ok(AttackerDataset { columns, discrete, records: matrix })
    }

    pub fn len(&self) -> usize {
        self.records.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.records.nrows() == 0
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.records.column(j))
    }

    /// A column as samples for the leakage estimators.
    pub fn samples(&self, name: &str) -> Option<Samples> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(Samples::new(self.records.slice(s![.., j..j + 1]).to_owned(), self.discrete[j]))
    }
}

/// Leakage under one attacker belief.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackerOutcome {
    pub candidate: Candidate,
    pub report: LeakageReport,
}

impl AttackerOutcome {
    /// Highest score in the report.
    pub fn score(&self) -> f64 {
        self.report.highest_leakage().map_or(0., |(_, s)| s)
    }
}

/// Outcomes of a leakage analysis over several attacker beliefs.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub outcomes: Vec<AttackerOutcome>,
}

impl Analysis {
    /// The belief under which the program leaks the most (the first
    /// one, on ties).
    pub fn strongest(&self) -> Option<&AttackerOutcome> {
        let mut best: Option<&AttackerOutcome> = None;
        for o in &self.outcomes {
            match best {
                Some(b) if b.score() >= o.score() => {},
                _ => best = Some(o),
            }
        }
        best
    }
}

/// Measures the leakage of the programs built from the first `count`
/// candidates.
///
/// `build` turns a candidate belief into a program; each program is
/// compiled, sampled with `config` and queried with `query`. The first
/// error stops the analysis.
pub fn analyze<I, F>(candidates: I, count: usize, build: F, config: &InferenceConfig,
                     query: &LeakageQuery) -> Result<Analysis, Error>
        where I: IntoIterator<Item = Result<Candidate, Error>>,
              F: Fn(&Candidate) -> Result<Program, Error> {
    let mut outcomes = Vec::with_capacity(count);
    for (i, candidate) in candidates.into_iter().take(count).enumerate() {
        let outcome = measure(candidate?, &build, config, query)?;
        info!(candidate = i, score = outcome.score(), "attacker belief analyzed");
        outcomes.push(outcome);
    }
    Ok(Analysis { outcomes })
}

/// Leakage of the program `build` makes of `candidate`.
pub(crate) fn measure<F>(candidate: Candidate, build: &F, config: &InferenceConfig,
                         query: &LeakageQuery) -> Result<AttackerOutcome, Error>
        where F: Fn(&Candidate) -> Result<Program, Error> {
    let program = build(&candidate)?;
    let graph = compile(&program)?;
    let trace = infer(&graph, config)?;
    let report = leakage(&trace, query)?;
    Ok(AttackerOutcome { candidate, report })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::DistKind;
    use crate::measures::{mutual_information, Estimator, EstimatorParams};
    use crate::program::{Dataset, OutputSpec, Value};

    #[test]
    fn dataset_columns() {
        let a = RandomVariable::discrete_uniform("a", 0., 9.).unwrap();
        let b = RandomVariable::normal("b", 5., 1.).unwrap().with_elements(2).unwrap();
        let dataset = AttackerDataset::draw(&[a, b], 500, 3).unwrap();

        assert_eq!(dataset.columns, vec!["a", "b[0]", "b[1]"]);
        assert_eq!(dataset.discrete, vec![true, false, false]);
        assert_eq!(dataset.len(), 500);
        let a = dataset.column("a").unwrap();
        assert!(a.iter().all(|x| x.fract() == 0. && *x >= 0. && *x <= 9.));
        let mean = dataset.column("b[1]").unwrap().mean().unwrap();
        assert!((mean - 5.).abs() < 0.2);
        assert!(dataset.column("b").is_none());

        // Same seed, same records.
        let again = AttackerDataset::draw(&[RandomVariable::discrete_uniform("a", 0., 9.)
                                                           .unwrap()], 500, 3).unwrap();
        assert_eq!(again.column("a").unwrap(), dataset.column("a").unwrap());
    }

    #[test]
    fn dataset_needs_literals() {
        let x = RandomVariable::normal("x", crate::distributions::Param::var("m"), 1.)
                               .unwrap();
        assert!(AttackerDataset::draw(&[x], 10, 0).is_err());
    }

    #[test]
    fn dataset_samples_feed_the_estimators() {
        let g = ScalarGenerator::int("s", Ranges::new(0., 20.).unwrap(),
                                     CoveragePolicy::default())
                                .unwrap()
                                .with_kinds(&[DistKind::DiscreteUniform])
                                .unwrap();
        let candidate = g.iter().next().unwrap().unwrap();
        let dataset = AttackerDataset::draw(&candidate.variables, 1000, 1).unwrap();
        let s = dataset.samples("s").unwrap();
        assert!(s.discrete);
        let params = EstimatorParams { estimator: Estimator::Discrete,
                                       ..EstimatorParams::default() };
        let mi = mutual_information(&s, &s, &params).unwrap();
        assert!(mi > 2.);
    }

    #[test]
    fn strongest_belief() {
        // The output reveals the secret when it is below 3: the more mass
        // a belief puts there, the more the program leaks.
        let g = ScalarGenerator::int("secret", Ranges::new(0., 10.).unwrap(),
                                     CoveragePolicy::default())
                                .unwrap()
                                .with_seed(11);
        let build = |c: &Candidate| {
            let dataset = Dataset::new().secret(c.variables[0].clone());
            Ok::<_, Error>(Program::new("threshold", dataset, OutputSpec::int("out"),
                            |v: &[Value]| {
                                let s = v[0].scalar()?;
                                Ok(vec![Value::from(if s < 3. { s } else { 3. })])
                            }))
        };
        let config = InferenceConfig { sample_count: 500, chains: 1, seed: Some(2),
                                       ..InferenceConfig::default() };
        let query = LeakageQuery::new(&["secret"], &["out"]);

        let analysis = analyze(g.iter(), 4, build, &config, &query).unwrap();
        assert_eq!(analysis.outcomes.len(), 4);
        let best = analysis.strongest().unwrap();
        assert!(analysis.outcomes.iter().all(|o| o.score() <= best.score()));

        let empty = Analysis { outcomes: Vec::new() };
        assert!(empty.strongest().is_none());
    }
}
