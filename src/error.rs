//! Error types.
//!
//! Declaration and compilation errors are reported as soon as they are
//! detected and are never retried. Numerical trouble during sampling is
//! not an error: it ends up in the trace diagnostics instead (see
//! `inference::SamplerDivergenceWarning`).
use thiserror::Error;

/// A distribution parameter violates the constraints of its kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid parameter `{param}` of {kind} variable `{variable}`: {reason}")]
pub struct InvalidParameterError {
    pub variable: String,
    pub kind: String,
    pub param: String,
    pub reason: String,
}

/// Compiling a program into a model graph failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphCompilationError {
    #[error("variable `{0}` is declared more than once")]
    DuplicateVariable(String),
    #[error("parameter `{param}` of `{variable}` references unknown variable `{target}`")]
    UnresolvedReference {
        variable: String,
        param: String,
        target: String,
    },
    #[error("cyclic parameter references between: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("parameter `{param}` of `{variable}` references `{target}` with {found} \
             elements, expected 1 or {expected}")]
    NotBroadcastable {
        variable: String,
        param: String,
        target: String,
        found: usize,
        expected: usize,
    },
    #[error("transformation failed on probe input: {0}")]
    Transformation(#[from] TransformError),
    #[error("output `{output}` should have {expected} elements, the transformation returned {found}")]
    OutputShape {
        output: String,
        expected: usize,
        found: usize,
    },
    #[error("the program declares {expected} outputs, the transformation returned {found}")]
    OutputCount { expected: usize, found: usize },
    #[error("observation refers to unknown variable `{0}`")]
    UnknownObservationTarget(String),
    #[error("the program declares no outputs")]
    NoOutputs,
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameterError),
}

/// An observation string could not be understood.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    #[error("cannot parse observation `{expr}`: {reason}")]
    Parse { expr: String, reason: String },
    #[error("observation precision must be finite and non-negative, got {0}")]
    InvalidPrecision(f64),
}

/// Failure reported by a user transformation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

impl From<&str> for TransformError {
    fn from(s: &str) -> TransformError {
        TransformError(s.to_owned())
    }
}

impl From<String> for TransformError {
    fn from(s: String) -> TransformError {
        TransformError(s)
    }
}

/// An attacker generator cannot produce candidates that cover enough
/// of the requested range.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("generator `{generator}` covers {covered} points/bins, at least {required} are required")]
pub struct InsufficientCoverageError {
    pub generator: String,
    pub covered: usize,
    pub required: usize,
}

/// Inference could not run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("invalid inference configuration: {0}")]
    InvalidConfig(String),
    #[error("chain {chain} found no valid sample after {attempts} attempts")]
    NoValidSample { chain: usize, attempts: usize },
    #[error("cannot start sampling threads: {0}")]
    ThreadPool(String),
}

/// Too few samples for a stable estimate.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{available} samples available, at least {required} are required")]
pub struct InsufficientSamplesError {
    pub available: usize,
    pub required: usize,
}

/// A leakage query is structurally invalid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LeakageError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    #[error("secret has {secret} samples but output has {output}")]
    LengthMismatch { secret: usize, output: usize },
    #[error(transparent)]
    InsufficientSamples(#[from] InsufficientSamplesError),
    #[error("invalid estimator parameters: {0}")]
    InvalidParams(String),
    #[error("a leakage query needs at least one secret and one output")]
    EmptyQuery,
}

/// Loading samples from a file failed.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("line {line}: cannot parse `{value}` as a number")]
    Parse { line: usize, value: String },
    #[error("line {line}: expected {expected} columns, found {found}")]
    Columns {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("file contains no samples")]
    Empty,
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameterError),
    #[error(transparent)]
    Compilation(#[from] GraphCompilationError),
    #[error(transparent)]
    Observation(#[from] ObservationError),
    #[error(transparent)]
    Coverage(#[from] InsufficientCoverageError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Leakage(#[from] LeakageError),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl From<InsufficientSamplesError> for Error {
    fn from(e: InsufficientSamplesError) -> Error {
        Error::Leakage(LeakageError::InsufficientSamples(e))
    }
}
