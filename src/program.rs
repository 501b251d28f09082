//! Programs whose leakage we want to measure.
//!
//! A `Program` is a `Dataset` of declared inputs, each tagged secret or
//! public, a list of typed outputs, and a transformation: a pure function
//! from input values to output values. Optionally, observations on the
//! outputs (or inputs) condition the model.
//!
//! # Examples
//!
//! ```
//! use privug::distributions::RandomVariable;
//! use privug::program::{Dataset, OutputSpec, Program, Value};
//!
//! let ages = RandomVariable::uniform("ages", 0., 100.).unwrap()
//!                           .with_elements(10).unwrap();
//! let dataset = Dataset::new().secret(ages);
//!
//! let program = Program::new("average", dataset, OutputSpec::float("avg"),
//!                            |inputs: &[Value]| {
//!     let ages = inputs[0].as_slice();
//!     Ok(vec![Value::from(ages.iter().sum::<f64>() / ages.len() as f64)])
//! }).add_observation("40 < avg < 60", 0.1).unwrap();
//!
//! assert_eq!(program.observations().len(), 1);
//! ```
use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};

use crate::distributions::RandomVariable;
use crate::error::{ObservationError, TransformError};

/// Concrete value passed to, or returned by, a transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// The value of a scalar; fails on vectors.
    pub fn scalar(&self) -> Result<f64, TransformError> {
        match self {
            Value::Scalar(x) => Ok(*x),
            Value::Vector(v) => Err(TransformError(format!(
                "expected a scalar, got a vector of {} elements", v.len()))),
        }
    }

    /// All elements; a scalar is a one-element slice.
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Value::Scalar(x) => std::slice::from_ref(x),
            Value::Vector(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Value {
        Value::Scalar(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Scalar(if b { 1. } else { 0. })
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Value {
        Value::Vector(v)
    }
}

/// Whether the observer may be assumed to know the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Secret,
    Public,
}

/// Ordered, tagged program inputs.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    inputs: Vec<(RandomVariable, Role)>,
}

impl Dataset {
    pub fn new() -> Dataset {
        Dataset::default()
    }

    pub fn secret(mut self, rv: RandomVariable) -> Dataset {
        self.inputs.push((rv, Role::Secret));
        self
    }

    pub fn public(mut self, rv: RandomVariable) -> Dataset {
        self.inputs.push((rv, Role::Public));
        self
    }

    /// Inputs in declaration order.
    pub fn inputs(&self) -> &[(RandomVariable, Role)] {
        &self.inputs
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Value type of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Int,
    Float,
}

/// Declaration of one output of the transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub kind: OutputKind,
    pub width: usize,
}

impl OutputSpec {
    pub fn int(name: &str) -> OutputSpec {
        OutputSpec { name: name.to_owned(), kind: OutputKind::Int, width: 1 }
    }

    pub fn float(name: &str) -> OutputSpec {
        OutputSpec { name: name.to_owned(), kind: OutputKind::Float, width: 1 }
    }

    /// Declares a vector-valued output.
    pub fn with_width(mut self, width: usize) -> OutputSpec {
        self.width = width;
        self
    }

    pub fn is_discrete(&self) -> bool {
        self.kind == OutputKind::Int
    }
}

/// Comparison in an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Relation {
    fn parse(op: &str) -> Option<Relation> {
        match op {
            "==" => Some(Relation::Eq),
            "<" => Some(Relation::Lt),
            "<=" | "=<" => Some(Relation::Le),
            ">" => Some(Relation::Gt),
            ">=" | "=>" => Some(Relation::Ge),
            _ => None,
        }
    }

    /// The relation with its operands swapped: `a < x` is `x > a`.
    pub fn flip(self) -> Relation {
        match self {
            Relation::Eq => Relation::Eq,
            Relation::Lt => Relation::Gt,
            Relation::Le => Relation::Ge,
            Relation::Gt => Relation::Lt,
            Relation::Ge => Relation::Le,
        }
    }

    /// Whether `x <relation> bound` holds.
    pub fn holds(self, x: f64, bound: f64) -> bool {
        match self {
            Relation::Eq => x == bound,
            Relation::Lt => x < bound,
            Relation::Le => x <= bound,
            Relation::Gt => x > bound,
            Relation::Ge => x >= bound,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self {
            Relation::Eq => "==",
            Relation::Lt => "<",
            Relation::Le => "<=",
            Relation::Gt => ">",
            Relation::Ge => ">=",
        };
        write!(f, "{}", op)
    }
}

/// Knowledge the observer has about a variable, used to condition the
/// model.
///
/// The target is a variable name, optionally followed by an element
/// index (`"out[2]"`). Without an index, every element is constrained.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub target: String,
    pub constraints: Vec<(Relation, f64)>,
    /// Width of the likelihood band around the constraints; 0 makes every
    /// constraint exact.
    pub precision: f64,
}

impl Observation {
    /// `target == value`.
    pub fn equals(target: &str, value: f64, precision: f64)
            -> Result<Observation, ObservationError> {
        check_precision(precision)?;
        Ok(Observation {
            target: target.to_owned(),
            constraints: vec![(Relation::Eq, value)],
            precision,
        })
    }

    /// Parses expressions such as `"out == 42.5"`, `"52.5 < out"` or
    /// `"10 > out > 5"`.
    pub fn parse(expr: &str, precision: f64) -> Result<Observation, ObservationError> {
        check_precision(precision)?;
        let error = |reason: &str| ObservationError::Parse {
            expr: expr.to_owned(),
            reason: reason.to_owned(),
        };

        // Split into alternating operands and operators.
        let mut operands = vec![String::new()];
        let mut operators: Vec<String> = Vec::new();
        let mut in_op = false;
        for c in expr.chars() {
            if "<>=".contains(c) {
                if !in_op {
                    operators.push(String::new());
                    in_op = true;
                }
                if let Some(op) = operators.last_mut() {
                    op.push(c);
                }
            } else {
                if in_op {
                    operands.push(String::new());
                    in_op = false;
                }
                if let Some(operand) = operands.last_mut() {
                    operand.push(c);
                }
            }
        }
        let operands = operands.iter().map(|s| s.trim()).collect::<Vec<_>>();
        if operators.is_empty() || operands.len() != operators.len() + 1 || operands.len() > 3 {
            return Err(error("expected `a op b` or `a op b op c`"));
        }
        if operands.iter().any(|s| s.is_empty()) {
            return Err(error("missing operand"));
        }
        let relations = operators.iter()
            .map(|op| Relation::parse(op).ok_or_else(|| error(&format!("unknown operator `{}`", op))))
            .collect::<Result<Vec<_>, _>>()?;

        // Identifiers such as `inf` or `nan` are names, never numbers.
        let is_name = |s: &str| split_index(s).is_some();
        let number = |s: &str| s.parse::<f64>()
                                .map_err(|_| error(&format!("`{}` is not a number", s)));
        let names = operands.iter().filter(|s| is_name(**s)).count();
        if names != 1 {
            return Err(error("exactly one operand must be a variable name"));
        }

        let (target, constraints) = if operands.len() == 2 {
            if is_name(operands[0]) {
                (operands[0], vec![(relations[0], number(operands[1])?)])
            } else {
                (operands[1], vec![(relations[0].flip(), number(operands[0])?)])
            }
        } else {
            if !is_name(operands[1]) {
                return Err(error("in `a op x op b` the variable must be in the middle"));
            }
            if relations.contains(&Relation::Eq) {
                return Err(error("`==` cannot be chained"));
            }
            (operands[1], vec![(relations[0].flip(), number(operands[0])?),
                               (relations[1], number(operands[2])?)])
        };
        if constraints.iter().any(|(_, b)| !b.is_finite()) {
            return Err(error("bounds must be finite"));
        }

        Ok(Observation { target: target.to_owned(), constraints, precision })
    }
}

fn check_precision(precision: f64) -> Result<(), ObservationError> {
    if precision.is_finite() && precision >= 0. {
        Ok(())
    } else {
        Err(ObservationError::InvalidPrecision(precision))
    }
}

/// Splits `"name[3]"` into `("name", Some(3))`, and `"name"` into
/// `("name", None)`. Returns `None` for malformed selectors.
pub fn split_index(selector: &str) -> Option<(&str, Option<usize>)> {
    let valid_name = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    };
    match selector.find('[') {
        None => if valid_name(selector) { Some((selector, None)) } else { None },
        Some(open) => {
            let name = &selector[..open];
            let index = selector[open + 1..].strip_suffix(']')?.trim().parse().ok()?;
            if valid_name(name) { Some((name, Some(index))) } else { None }
        },
    }
}

/// A transformation from input values (non-hyper inputs, in declaration
/// order) to output values (one per declared output).
pub type Transformation =
    Arc<dyn Fn(&[Value]) -> Result<Vec<Value>, TransformError> + Send + Sync>;

/// Inputs, outputs and transformation of a program under analysis.
#[derive(Clone)]
pub struct Program {
    name: String,
    dataset: Dataset,
    outputs: Vec<OutputSpec>,
    transformation: Transformation,
    observations: Vec<Observation>,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Program")
         .field("name", &self.name)
         .field("dataset", &self.dataset)
         .field("outputs", &self.outputs)
         .field("observations", &self.observations)
         .finish()
    }
}

impl Program {
    pub fn new<F>(name: &str, dataset: Dataset, output: OutputSpec, f: F) -> Program
            where F: Fn(&[Value]) -> Result<Vec<Value>, TransformError> + Send + Sync + 'static {
        Program {
            name: name.to_owned(),
            dataset,
            outputs: vec![output],
            transformation: Arc::new(f),
            observations: Vec::new(),
        }
    }

    /// Declares a further output; the transformation must return one
    /// value per declared output, in order.
    pub fn with_output(mut self, output: OutputSpec) -> Program {
        self.outputs.push(output);
        self
    }

    pub fn observe(mut self, observation: Observation) -> Program {
        self.observations.push(observation);
        self
    }

    /// Parses and attaches an observation, e.g. `"10 > output > 5"`.
    pub fn add_observation(self, expr: &str, precision: f64)
            -> Result<Program, ObservationError> {
        Ok(self.observe(Observation::parse(expr, precision)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }
}
