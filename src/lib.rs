//! privug quantifies how much a program leaks about its secret inputs.
//!
//! The program is treated as a probabilistic program: secret and public
//! inputs are random variables with declared distributions, and the
//! program is a transformation of them. An observer only sees the
//! outputs, and wants to infer the secrets. privug:
//!
//! 1. compiles the declared inputs and the transformation into a model
//!    graph (`transformer::compile`);
//! 2. samples the model, from the prior or conditioned on observed
//!    outputs (`inference::infer`);
//! 3. estimates, from the samples, the mutual information between each
//!    secret and the outputs (`measures::leakage`).
//!
//! The `attacker` module synthesizes plausible background knowledge of
//! an adversary, to study how leakage varies with the prior assumptions.
//!
//! # Getting started
//!
//! ```
//! use privug::distributions::RandomVariable;
//! use privug::inference::{infer, InferenceConfig};
//! use privug::measures::{leakage, LeakageQuery};
//! use privug::program::{Dataset, OutputSpec, Program, Value};
//! use privug::transformer::compile;
//!
//! // Does the parity of a number leak more than its magnitude?
//! let dataset = Dataset::new()
//!     .secret(RandomVariable::discrete_uniform("x", 0., 15.).unwrap())
//!     .secret(RandomVariable::bernoulli("flag", 0.5).unwrap());
//! let program = Program::new("parity", dataset, OutputSpec::int("out"), |v: &[Value]| {
//!     Ok(vec![Value::from(v[0].scalar()? % 2.)])
//! });
//!
//! let graph = compile(&program).unwrap();
//! let config = InferenceConfig { sample_count: 1000, seed: Some(0),
//!                                ..InferenceConfig::default() };
//! let trace = infer(&graph, &config).unwrap();
//!
//! let report = leakage(&trace, &LeakageQuery::new(&["x", "flag"], &["out"])).unwrap();
//! let (secret, bits) = report.highest_leakage().unwrap();
//! assert_eq!(secret, "x");
//! assert!((bits - 1.).abs() < 0.05);
//! ```
//!
//! The `privug` binary estimates the leakage of black-box systems from
//! CSV samples of their secrets and outputs: `privug -h`.
//!
//! # References
//!
//! [1] 2021, "Privug: Using Probabilistic Programming for Quantifying
//!     Leakage in Privacy Risk Analysis". _Raúl Pardo, Willard Rafnsson,
//!     Christian W. Probst, Andrzej Wąsowski_.
//!
//! [2] 2004, "Estimating mutual information". _Alexander Kraskov, Harald
//!     Stögbauer, Peter Grassberger_.
//!
//! [3] 2014, "Mutual Information between Discrete and Continuous Data
//!     Sets". _Brian C. Ross_.
pub mod attacker;
pub mod distributions;
pub mod error;
pub mod inference;
pub mod measures;
pub mod program;
pub mod security_measures;
pub mod transformer;
pub mod utils;

pub use crate::error::Error;
pub use crate::inference::{infer, InferenceConfig, PosteriorTrace};
pub use crate::measures::{leakage, mutual_information, LeakageQuery, LeakageReport};
pub use crate::transformer::{compile, ModelGraph};
