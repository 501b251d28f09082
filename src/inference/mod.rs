//! Prior and posterior sampling over a compiled model graph.
//!
//! `infer()` runs `chains` independent chains on a `rayon` thread pool of
//! `cores` threads. Each chain owns its RNG, seeded from the run seed and
//! jumped ahead `chain` times, so results only depend on the seed (and not
//! on scheduling). Chains never share state; their samples are merged
//! after all of them join.
//!
//! Unconditioned graphs are sampled ancestrally from the prior. When
//! observations are attached, each chain runs Metropolis-within-Gibbs,
//! using the step method the transformer assigned to each node.
//!
//! # Examples
//!
//! ```
//! use privug::distributions::RandomVariable;
//! use privug::inference::{infer, InferenceConfig};
//! use privug::program::{Dataset, OutputSpec, Program, Value};
//! use privug::transformer::compile;
//!
//! let x = RandomVariable::normal("x", 0., 1.).unwrap();
//! let program = Program::new("double", Dataset::new().secret(x), OutputSpec::float("y"),
//!                            |v: &[Value]| Ok(vec![Value::from(2. * v[0].scalar()?)]));
//! let graph = compile(&program).unwrap();
//!
//! let config = InferenceConfig { sample_count: 200, chains: 2, seed: Some(1),
//!                                ..InferenceConfig::default() };
//! let trace = infer(&graph, &config).unwrap();
//! assert_eq!(trace.len(), 400);
//! ```
pub mod diagnostics;
pub mod trace;
mod sampler;

pub use self::diagnostics::{ChainDiagnostics, Diagnostics, SamplerDivergenceWarning,
                            VariableDiagnostics};
pub use self::trace::{PosteriorTrace, VarRole, VariableInfo};

use std::time::{Duration, Instant};
use ndarray::prelude::*;
use ndarray::aview1;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use self::sampler::{Chain, MAX_WARNINGS, TUNE_INTERVAL};
use crate::error::InferenceError;
use crate::program::Role;
use crate::transformer::ModelGraph;

/// Sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerKind {
    /// Prior sampling for unconditioned graphs, MCMC otherwise.
    Auto,
    /// MCMC even without observations.
    Metropolis,
    /// Ancestral sampling from the prior; observations are ignored.
    Prior,
}

/// Inference parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Draws kept per chain.
    pub sample_count: usize,
    pub chains: usize,
    /// Iterations per chain spent adapting step scales; not kept.
    pub tune: usize,
    pub sampler: SamplerKind,
    /// Threads running chains.
    pub cores: usize,
    /// Random seed; drawn from the OS when missing.
    pub seed: Option<u64>,
    /// Prior draws tried, per chain, to find a starting point with
    /// finite posterior density.
    pub max_init_attempts: usize,
    /// Chains stop early once the budget is spent.
    pub time_budget: Option<Duration>,
}

impl Default for InferenceConfig {
    fn default() -> InferenceConfig {
        InferenceConfig {
            sample_count: 1000,
            chains: 2,
            tune: 500,
            sampler: SamplerKind::Auto,
            cores: rayon::current_num_threads(),
            seed: None,
            max_init_attempts: 1000,
            time_budget: None,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |msg: &str| Err(InferenceError::InvalidConfig(msg.to_owned()));
        if self.sample_count == 0 {
            return invalid("sample_count must be positive");
        }
        if self.chains == 0 {
            return invalid("at least one chain is required");
        }
        if self.cores == 0 {
            return invalid("cores must be positive");
        }
        if self.max_init_attempts == 0 {
            return invalid("max_init_attempts must be positive");
        }
        Ok(())
    }
}

// Where a traced variable is read from.
#[derive(Clone, Copy)]
enum Source {
    Node(usize),
    Output(usize),
}

// Preallocated sample matrices of one chain.
struct Recorder {
    samples: Vec<Array2<f64>>,
    rows: usize,
}

impl Recorder {
    fn new(variables: &[VariableInfo], capacity: usize) -> Recorder {
        Recorder {
            samples: variables.iter().map(|v| Array2::zeros((capacity, v.width))).collect(),
            rows: 0,
        }
    }

    fn push(&mut self, sources: &[Source], state: &[Vec<f64>], outputs: &[Vec<f64>]) {
        for (matrix, source) in self.samples.iter_mut().zip(sources) {
            let values = match *source {
                Source::Node(i) => &state[i],
                Source::Output(o) => &outputs[o],
            };
            matrix.row_mut(self.rows).assign(&aview1(values));
        }
        self.rows += 1;
    }

    fn finish(self) -> Vec<Array2<f64>> {
        let rows = self.rows;
        self.samples.into_iter().map(|m| m.slice_move(s![..rows, ..])).collect()
    }
}

struct ChainRun {
    samples: Vec<Array2<f64>>,
    diagnostics: ChainDiagnostics,
    warnings: Vec<SamplerDivergenceWarning>,
}

/// Samples the joint distribution of inputs and outputs of `graph`,
/// conditioned on its observations.
///
/// Fails on an invalid configuration, or if some chain finds no valid
/// starting point. Numerical trouble while sampling is recorded in the
/// trace diagnostics instead.
pub fn infer(graph: &ModelGraph, config: &InferenceConfig)
        -> Result<PosteriorTrace, InferenceError> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let prior = match config.sampler {
        SamplerKind::Prior => true,
        SamplerKind::Metropolis => false,
        SamplerKind::Auto => !graph.is_conditioned(),
    };
    if prior && graph.is_conditioned() {
        warn!(model = graph.name(), "prior sampling ignores the observations");
    }
    let (variables, sources) = traced_variables(graph);
    let deadline = config.time_budget.map(|budget| Instant::now() + budget);

    debug!(model = graph.name(), seed, chains = config.chains, cores = config.cores,
           prior, "starting inference");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.cores.min(config.chains))
        .build()
        .map_err(|e| InferenceError::ThreadPool(e.to_string()))?;
    let runs = pool.install(|| {
        (0..config.chains).into_par_iter()
            .map(|chain| {
                let mut rng = chain_rng(seed, chain);
                if prior {
                    prior_chain(graph, chain, config, &variables, &sources, deadline, &mut rng)
                } else {
                    mcmc_chain(graph, chain, config, &variables, &sources, deadline, &mut rng)
                }
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut chains = Vec::with_capacity(runs.len());
    let mut diagnostics = Diagnostics::default();
    for run in runs {
        diagnostics.chains.push(run.diagnostics);
        diagnostics.warnings.extend(run.warnings);
        chains.push(run.samples);
    }
    diagnostics.variables = variables.iter().enumerate()
        .map(|(v, info)| {
            let elements = (0..info.width)
                .map(|e| chains.iter().map(|c| c[v].column(e).to_vec()).collect::<Vec<_>>())
                .collect::<Vec<_>>();
            VariableDiagnostics {
                name: info.name.clone(),
                r_hat: elements.iter().map(|c| diagnostics::r_hat(c)).collect(),
                ess: elements.iter().map(|c| diagnostics::ess(c)).collect(),
            }
        })
        .collect();

    info!(model = graph.name(), chains = config.chains,
          draws = diagnostics.chains.iter().map(|c| c.draws).sum::<usize>(),
          divergences = diagnostics.total_divergences(),
          max_r_hat = ?diagnostics.max_r_hat(),
          truncated = diagnostics.is_truncated(), "inference done");

    Ok(PosteriorTrace::new(graph.name().to_owned(), variables, chains, diagnostics,
                           !prior && graph.is_conditioned()))
}

/// RNG of chain `chain`: the seeded generator, jumped `chain` times.
/// Streams of different chains do not overlap.
fn chain_rng(seed: u64, chain: usize) -> Xoshiro256PlusPlus {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for _ in 0..chain {
        rng.jump();
    }
    rng
}

/// Declared inputs, in declaration order, then outputs.
fn traced_variables(graph: &ModelGraph) -> (Vec<VariableInfo>, Vec<Source>) {
    let unreachable = graph.unreachable_secrets();
    let mut variables = Vec::new();
    let mut sources = Vec::new();
    for &i in graph.declaration_order() {
        let node = &graph.nodes()[i];
        variables.push(VariableInfo {
            name: node.name.clone(),
            width: node.width,
            scalar: node.scalar,
            discrete: node.kind.is_discrete(),
            hyper: node.hyper,
            role: match node.role {
                Role::Secret => VarRole::Secret,
                Role::Public => VarRole::Public,
            },
            reachable: !unreachable.contains(&node.name.as_str()),
        });
        sources.push(Source::Node(i));
    }
    for (o, output) in graph.outputs().iter().enumerate() {
        variables.push(VariableInfo {
            name: output.name.clone(),
            width: output.width,
            scalar: output.width == 1,
            discrete: output.is_discrete(),
            hyper: false,
            role: VarRole::Output,
            reachable: true,
        });
        sources.push(Source::Output(o));
    }
    (variables, sources)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

fn prior_chain<R: Rng>(graph: &ModelGraph, chain: usize, config: &InferenceConfig,
                       variables: &[VariableInfo], sources: &[Source],
                       deadline: Option<Instant>, rng: &mut R)
        -> Result<ChainRun, InferenceError> {
    let mut recorder = Recorder::new(variables, config.sample_count);
    let mut warnings = Vec::new();
    let mut divergences = 0;
    let mut truncated = false;

    for iteration in 0..config.sample_count {
        if expired(deadline) {
            truncated = true;
            break;
        }
        let mut attempts = 0;
        loop {
            attempts += 1;
            let draw = graph.sample_prior(rng)
                .map_err(|e| (e.variable.clone(), e.to_string()))
                .and_then(|state| match graph.evaluate(&state) {
                    Ok(outputs) => Ok((state, outputs)),
                    Err(e) => Err((graph.name().to_owned(), e.to_string())),
                });
            match draw {
                Ok((state, outputs)) => {
                    recorder.push(sources, &state, &outputs);
                    break;
                },
                Err(_) if attempts >= config.max_init_attempts =>
                    return Err(InferenceError::NoValidSample { chain, attempts }),
                Err((variable, reason)) => {
                    divergences += 1;
                    if warnings.len() < MAX_WARNINGS {
                        warn!(chain, iteration, variable = %variable, reason = %reason,
                              "prior draw rejected");
                        warnings.push(SamplerDivergenceWarning { chain, iteration, variable,
                                                                 reason });
                    }
                },
            }
        }
    }

    let samples = recorder.finish();
    let draws = samples.first().map_or(0, |s| s.nrows());
    debug!(chain, draws, divergences, truncated, "prior chain done");
    Ok(ChainRun {
        samples,
        diagnostics: ChainDiagnostics {
            chain,
            draws,
            acceptance_rate: 1.,
            divergences,
            truncated,
        },
        warnings,
    })
}

fn mcmc_chain<R: Rng>(graph: &ModelGraph, chain: usize, config: &InferenceConfig,
                      variables: &[VariableInfo], sources: &[Source],
                      deadline: Option<Instant>, rng: &mut R)
        -> Result<ChainRun, InferenceError> {
    let mut sampler = Chain::init(graph, chain, rng, config.max_init_attempts)?;
    let mut recorder = Recorder::new(variables, config.sample_count);
    let mut truncated = false;

    for iteration in 0..config.tune + config.sample_count {
        if expired(deadline) {
            truncated = true;
            break;
        }
        let tuning = iteration < config.tune;
        sampler.sweep(rng, tuning);
        if tuning {
            if (iteration + 1) % TUNE_INTERVAL == 0 {
                sampler.tune();
            }
        } else {
            recorder.push(sources, sampler.state(), sampler.outputs());
        }
    }

    let (acceptance_rate, divergences, warnings) = sampler.finish();
    let samples = recorder.finish();
    let draws = samples.first().map_or(0, |s| s.nrows());
    debug!(chain, draws, acceptance_rate, divergences, truncated, "chain done");
    Ok(ChainRun {
        samples,
        diagnostics: ChainDiagnostics { chain, draws, acceptance_rate, divergences, truncated },
        warnings,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use crate::distributions::{Param, RandomVariable};
    use crate::error::TransformError;
    use crate::program::{Dataset, OutputSpec, Program, Value};
    use crate::transformer::compile;

    fn identity(v: &[Value]) -> Result<Vec<Value>, TransformError> {
        Ok(vec![v[0].clone()])
    }

    fn config(sample_count: usize, seed: u64) -> InferenceConfig {
        InferenceConfig {
            sample_count,
            chains: 2,
            tune: 1000,
            cores: 2,
            seed: Some(seed),
            ..InferenceConfig::default()
        }
    }

    fn mean(x: &[f64]) -> f64 {
        x.iter().sum::<f64>() / x.len() as f64
    }

    fn column(trace: &PosteriorTrace, name: &str) -> Vec<f64> {
        trace.merged(name).unwrap().column(0).to_vec()
    }

    #[test]
    fn prior_sampling() {
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("x", Param::var("mu"), 2.).unwrap())
            .public(RandomVariable::discrete_uniform("mu", 4, 6).unwrap().hyper());
        let graph = compile(&Program::new("p", dataset, OutputSpec::float("out"), identity))
                        .unwrap();
        let trace = infer(&graph, &config(4000, 1)).unwrap();

        assert!(!trace.is_conditioned());
        assert_eq!(trace.variables().iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
                   vec!["x", "mu", "out"]);
        assert!(trace.variable("mu").unwrap().hyper);
        assert_eq!(trace.variable("out").unwrap().role, VarRole::Output);
        assert_eq!(trace.len(), 8000);

        let x = column(&trace, "x");
        assert_eq!(x, column(&trace, "out"));
        assert!((mean(&x) - 5.).abs() < 0.1, "mean {}", mean(&x));
        assert!(column(&trace, "mu").iter().all(|m| *m == 4. || *m == 5. || *m == 6.));
        assert_eq!(trace.diagnostics().chains[0].acceptance_rate, 1.);
    }

    #[test]
    fn conjugate_normal_posterior() {
        // x ~ N(0, 1), y = x observed at 1 with noise 0.5:
        // the posterior is N(0.8, 0.2).
        let dataset = Dataset::new().secret(RandomVariable::normal("x", 0., 1.).unwrap());
        let program = Program::new("p", dataset, OutputSpec::float("y"), identity)
            .add_observation("y == 1", 0.5).unwrap();
        let graph = compile(&program).unwrap();
        let trace = infer(&graph, &config(3000, 2)).unwrap();

        assert!(trace.is_conditioned());
        let x = column(&trace, "x");
        let m = mean(&x);
        let v = x.iter().map(|a| (a - m).powi(2)).sum::<f64>() / x.len() as f64;
        assert!((m - 0.8).abs() < 0.1, "posterior mean {}", m);
        assert!((v - 0.2).abs() < 0.06, "posterior variance {}", v);

        let d = trace.diagnostics();
        assert!(d.max_r_hat().unwrap() < 1.1);
        assert!(d.min_ess().unwrap() > 100.);
        assert!(d.chains.iter().all(|c| c.acceptance_rate > 0.1 && c.acceptance_rate < 0.9));
    }

    #[test]
    fn exact_discrete_observation() {
        let dataset = Dataset::new()
            .secret(RandomVariable::discrete_uniform("x", 0, 9).unwrap());
        let program = Program::new("double", dataset, OutputSpec::int("out"),
                                   |v: &[Value]| Ok(vec![Value::from(2. * v[0].scalar()?)]))
            .add_observation("out == 4", 0.).unwrap();
        let graph = compile(&program).unwrap();
        let trace = infer(&graph, &config(500, 3)).unwrap();
        assert!(column(&trace, "x").iter().all(|x| *x == 2.));
        assert!(column(&trace, "out").iter().all(|x| *x == 4.));
    }

    #[test]
    fn categorical_and_binary_steps() {
        let dataset = Dataset::new()
            .secret(RandomVariable::categorical("c", vec![0.2, 0.3, 0.5]).unwrap())
            .secret(RandomVariable::bernoulli("b", 0.5).unwrap());
        let program = Program::new("p", dataset, OutputSpec::int("c_out"),
                                   |v: &[Value]| Ok(vec![v[0].clone(), v[1].clone()]))
            .with_output(OutputSpec::float("b_out"))
            .add_observation("c_out > 0", 0.).unwrap()
            .add_observation("b_out == 1", 0.5).unwrap();
        let graph = compile(&program).unwrap();
        let trace = infer(&graph, &config(3000, 4)).unwrap();

        let c = column(&trace, "c");
        assert!(c.iter().all(|c| *c == 1. || *c == 2.));
        let twos = c.iter().filter(|c| **c == 2.).count() as f64 / c.len() as f64;
        assert!((twos - 0.625).abs() < 0.05, "P(c = 2) = {}", twos);

        // P(b = 1 | band) = 1 / (1 + exp(-2)).
        let ones = mean(&column(&trace, "b"));
        assert!((ones - 0.8808).abs() < 0.05, "P(b = 1) = {}", ones);
    }

    #[test]
    fn runs_are_reproducible() {
        let dataset = || Dataset::new()
            .secret(RandomVariable::normal("x", 0., 1.).unwrap().with_elements(2).unwrap());
        let program = || Program::new("p", dataset(), OutputSpec::float("y").with_width(2),
                                      identity)
            .add_observation("y[0] > 0.5", 0.1).unwrap();
        let graph = compile(&program()).unwrap();
        let a = infer(&graph, &config(200, 5)).unwrap();
        let b = infer(&graph, &InferenceConfig { cores: 1, ..config(200, 5) }).unwrap();
        assert_eq!(a, b);
        // Chains use different streams.
        assert_ne!(a.chain(0, "x").unwrap(), a.chain(1, "x").unwrap());
    }

    #[test]
    fn failing_transformation_is_a_divergence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let dataset = Dataset::new().secret(RandomVariable::uniform("x", 0., 1.).unwrap());
        let program = Program::new("p", dataset, OutputSpec::float("y"), move |v: &[Value]| {
            let x = v[0].scalar()?;
            // The compile-time probe always succeeds.
            if counter.fetch_add(1, Ordering::SeqCst) > 0 && x > 0.5 {
                return Err(TransformError::from("x too large"));
            }
            Ok(vec![Value::from(x)])
        }).add_observation("y == 0.25", 1.).unwrap();
        let graph = compile(&program).unwrap();
        let trace = infer(&graph, &config(500, 6)).unwrap();

        assert!(column(&trace, "x").iter().all(|x| *x <= 0.5));
        let d = trace.diagnostics();
        assert!(d.has_divergences());
        assert!(!d.warnings.is_empty() && d.warnings.len() <= 2 * MAX_WARNINGS);
        assert_eq!(d.warnings[0].variable, "x");
        assert!(calls.load(Ordering::SeqCst) > 1000);
    }

    #[test]
    fn no_valid_starting_point() {
        let dataset = Dataset::new().secret(RandomVariable::normal("x", 0., 1.).unwrap());
        let program = Program::new("p", dataset, OutputSpec::float("y"), identity)
            .add_observation("y == 3", 0.).unwrap();
        let graph = compile(&program).unwrap();
        let config = InferenceConfig { max_init_attempts: 50, chains: 1, ..config(10, 7) };
        assert_eq!(infer(&graph, &config).unwrap_err(),
                   InferenceError::NoValidSample { chain: 0, attempts: 50 });
    }

    #[test]
    fn time_budget_truncates() {
        let dataset = Dataset::new().secret(RandomVariable::normal("x", 0., 1.).unwrap());
        let graph = compile(&Program::new("p", dataset, OutputSpec::float("y"), identity))
                        .unwrap();
        let config = InferenceConfig { time_budget: Some(Duration::from_secs(0)),
                                       ..config(100, 8) };
        let trace = infer(&graph, &config).unwrap();
        assert!(trace.diagnostics().is_truncated());
        assert_eq!(trace.len(), 0);
        assert_eq!(trace.merged("x").unwrap().dim(), (0, 1));
    }

    #[test]
    fn invalid_configs() {
        let bad = vec![
            InferenceConfig { sample_count: 0, ..InferenceConfig::default() },
            InferenceConfig { chains: 0, ..InferenceConfig::default() },
            InferenceConfig { cores: 0, ..InferenceConfig::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(InferenceError::InvalidConfig(_))));
        }
        assert!(InferenceConfig::default().validate().is_ok());
    }

    #[test]
    fn config_from_json() {
        let config: InferenceConfig =
            serde_json::from_str(r#"{"sample_count": 10, "sampler": "Prior"}"#).unwrap();
        assert_eq!(config.sample_count, 10);
        assert_eq!(config.sampler, SamplerKind::Prior);
        assert_eq!(config.chains, 2);
    }
}
