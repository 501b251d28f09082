//! Compilation of a `Program` into a `ModelGraph`.
//!
//! The model graph is a Bayesian network: one stochastic node per
//! declared input, in topological order (every variable comes after the
//! variables its parameters reference), plus the wrapped transformation,
//! whose return values are the output nodes. Observations become
//! likelihood terms on the nodes they refer to.
//!
//! Compilation is pure: compiling the same program twice yields
//! identical graphs.
//!
//! # Examples
//!
//! ```
//! use privug::distributions::{RandomVariable, Param};
//! use privug::program::{Dataset, OutputSpec, Program, Value};
//! use privug::transformer::compile;
//!
//! let x = RandomVariable::normal("x", Param::var("mu"), 1.).unwrap();
//! let mu = RandomVariable::normal("mu", 0., 10.).unwrap().hyper();
//! let program = Program::new("shift", Dataset::new().secret(x).public(mu),
//!                            OutputSpec::float("y"),
//!                            |v: &[Value]| Ok(vec![Value::from(v[0].scalar()? + 1.)]));
//!
//! let graph = compile(&program).unwrap();
//! assert_eq!(graph.node_names(), vec!["mu", "x"]);
//! ```
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use float_cmp::approx_eq;
use rand::{Rng, SeedableRng};
use rand::distributions::Distribution;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, warn};

use crate::distributions::{Dist, DistKind, Param};
use crate::error::{GraphCompilationError, InvalidParameterError};
use crate::program::{split_index, OutputSpec, Program, Relation, Role, Transformation, Value};

// The probe input is drawn from the prior with a fixed seed, so that
// compilation is repeatable.
const PROBE_SEED: u64 = 0x5eed;
const PROBE_ATTEMPTS: usize = 100;

/// Parameter binding of a compiled node.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(f64),
    Probs(Vec<f64>),
    /// Index of the parent node in the graph.
    Node(usize),
}

/// How the sampler updates a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMethod {
    /// Never updated (constants).
    Fixed,
    /// Flip proposals for Bernoulli nodes.
    BinaryGibbs,
    /// Exact draw from the full conditional of a Categorical node.
    CategoricalGibbs,
    /// Integer random walk.
    DiscreteMetropolis,
    /// Gaussian random walk.
    Metropolis,
}

impl StepMethod {
    pub fn for_kind(kind: DistKind) -> StepMethod {
        match kind {
            DistKind::Constant => StepMethod::Fixed,
            DistKind::Bernoulli => StepMethod::BinaryGibbs,
            DistKind::Categorical => StepMethod::CategoricalGibbs,
            k if k.is_discrete() => StepMethod::DiscreteMetropolis,
            _ => StepMethod::Metropolis,
        }
    }
}

/// A stochastic node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: DistKind,
    pub role: Role,
    pub width: usize,
    /// Declared as a scalar (as opposed to a vector of width 1).
    pub scalar: bool,
    pub hyper: bool,
    /// Position in the program's dataset.
    pub declared: usize,
    pub params: Vec<(&'static str, Binding)>,
    pub step: StepMethod,
    /// Nodes whose parameters reference this one.
    pub children: Vec<usize>,
    /// Some observation constrains this node directly.
    pub observed: bool,
    // Distribution, when no parameter is a reference.
    fixed: Option<Dist>,
}

/// Where an observation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Input { node: usize, element: Option<usize> },
    Output { output: usize, element: Option<usize> },
}

/// An observation, bound to a graph site.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundObservation {
    pub site: Site,
    pub constraints: Vec<(Relation, f64)>,
    pub precision: f64,
    pub discrete: bool,
}

/// A compiled program.
#[derive(Clone)]
pub struct ModelGraph {
    name: String,
    nodes: Vec<Node>,
    outputs: Vec<OutputSpec>,
    transformation: Transformation,
    // Nodes passed to the transformation, in declaration order.
    args: Vec<usize>,
    observations: Vec<BoundObservation>,
    // Node of each declared input.
    declaration: Vec<usize>,
}

impl fmt::Debug for ModelGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ModelGraph")
         .field("name", &self.name)
         .field("nodes", &self.nodes)
         .field("outputs", &self.outputs)
         .field("observations", &self.observations)
         .finish()
    }
}

/// Values of every node, indexed like `ModelGraph::nodes()`.
pub type State = Vec<Vec<f64>>;

/// Compiles `program` into a model graph.
///
/// Fails if names are not unique, a parameter references an unknown
/// variable, references form a cycle, shapes do not broadcast, or the
/// transformation fails (or returns the wrong shape) on a prior draw.
pub fn compile(program: &Program) -> Result<ModelGraph, GraphCompilationError> {
    let inputs = program.dataset().inputs();
    let outputs = program.outputs();
    if outputs.is_empty() {
        return Err(GraphCompilationError::NoOutputs);
    }

    // Names must be unique across inputs and outputs.
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, (rv, _)) in inputs.iter().enumerate() {
        if index.insert(rv.name(), i).is_some() {
            return Err(GraphCompilationError::DuplicateVariable(rv.name().to_owned()));
        }
    }
    for (i, output) in outputs.iter().enumerate() {
        if index.contains_key(output.name.as_str())
                || outputs[..i].iter().any(|o| o.name == output.name) {
            return Err(GraphCompilationError::DuplicateVariable(output.name.clone()));
        }
    }

    // Explicit dependency graph over declaration indices.
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); inputs.len()];
    for (i, (rv, _)) in inputs.iter().enumerate() {
        for (param, target) in rv.references() {
            let j = *index.get(target).ok_or_else(||
                GraphCompilationError::UnresolvedReference {
                    variable: rv.name().to_owned(),
                    param: param.to_owned(),
                    target: target.to_owned(),
                })?;
            if j == i {
                return Err(GraphCompilationError::Cycle(vec![rv.name().to_owned()]));
            }
            let found = inputs[j].0.num_elements();
            if found != 1 && found != rv.num_elements() {
                return Err(GraphCompilationError::NotBroadcastable {
                    variable: rv.name().to_owned(),
                    param: param.to_owned(),
                    target: target.to_owned(),
                    found,
                    expected: rv.num_elements(),
                });
            }
            if !parents[i].contains(&j) {
                parents[i].push(j);
            }
        }
    }

    let order = topological_order(&parents)
        .map_err(|stuck| GraphCompilationError::Cycle(
            stuck.iter().map(|&i| inputs[i].0.name().to_owned()).collect()))?;

    let mut declaration = vec![0; inputs.len()];
    for (node, &d) in order.iter().enumerate() {
        declaration[d] = node;
    }

    let mut nodes = Vec::with_capacity(inputs.len());
    for &d in &order {
        let (rv, role) = &inputs[d];
        let params = rv.get_params().iter()
            .map(|(p, v)| (*p, match v {
                Param::Value(x) => Binding::Value(*x),
                Param::Probs(w) => Binding::Probs(w.clone()),
                // References were resolved above.
                Param::Var(t) => Binding::Node(declaration[index[t.as_str()]]),
            }))
            .collect();
        nodes.push(Node {
            name: rv.name().to_owned(),
            kind: rv.kind(),
            role: *role,
            width: rv.num_elements(),
            scalar: rv.shape() == crate::distributions::Shape::Scalar,
            hyper: rv.is_hyper_param(),
            declared: d,
            params,
            step: StepMethod::for_kind(rv.kind()),
            children: Vec::new(),
            observed: false,
            fixed: rv.to_dist().transpose()?,
        });
    }
    for (d, ps) in parents.iter().enumerate() {
        for p in ps {
            nodes[declaration[*p]].children.push(declaration[d]);
        }
    }
    for node in nodes.iter_mut() {
        node.children.sort_unstable();
    }

    let args = (0..inputs.len()).filter(|&d| !inputs[d].0.is_hyper_param())
                                .map(|d| declaration[d])
                                .collect();

    let mut observations = Vec::new();
    for obs in program.observations() {
        let unknown = || GraphCompilationError::UnknownObservationTarget(obs.target.clone());
        let (name, element) = split_index(&obs.target).ok_or_else(unknown)?;
        let (site, width, discrete) =
            if let Some(o) = outputs.iter().position(|o| o.name == name) {
                (Site::Output { output: o, element }, outputs[o].width, outputs[o].is_discrete())
            } else if let Some(&d) = index.get(name) {
                let node = declaration[d];
                nodes[node].observed = true;
                (Site::Input { node, element }, nodes[node].width, nodes[node].kind.is_discrete())
            } else {
                return Err(unknown());
            };
        if element.map_or(false, |e| e >= width) {
            return Err(unknown());
        }
        observations.push(BoundObservation {
            site,
            constraints: obs.constraints.clone(),
            precision: obs.precision,
            discrete,
        });
    }

    let graph = ModelGraph {
        name: program.name().to_owned(),
        nodes,
        outputs: outputs.to_vec(),
        transformation: program.transformation().clone(),
        args,
        observations,
        declaration,
    };
    graph.probe()?;

    for name in graph.unreachable_secrets() {
        warn!(model = %graph.name, secret = name,
              "secret parameterizes no input of the transformation; its leakage is zero");
    }
    debug!(model = %graph.name, nodes = graph.nodes.len(), outputs = graph.outputs.len(),
           observations = graph.observations.len(), "compiled model graph");
    Ok(graph)
}

/// Kahn's algorithm; among the nodes ready at any point the first
/// declared goes first. On a cycle, returns the nodes that could not be
/// ordered.
fn topological_order(parents: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = parents.len();
    let mut indegree = parents.iter().map(|p| p.len()).collect::<Vec<_>>();
    let mut children = vec![Vec::new(); n];
    for (i, ps) in parents.iter().enumerate() {
        for &p in ps {
            children[p].push(i);
        }
    }

    let mut ready = (0..n).filter(|&i| indegree[i] == 0).collect::<BTreeSet<_>>();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.iter().next().cloned() {
        ready.remove(&i);
        order.push(i);
        for &c in &children[i] {
            indegree[c] -= 1;
            if indegree[c] == 0 {
                ready.insert(c);
            }
        }
    }

    if order.len() < n {
        Err((0..n).filter(|&i| indegree[i] > 0).collect())
    } else {
        Ok(order)
    }
}

/// Log-likelihood of value `x` under one observed constraint.
///
/// Discrete targets, and any target when `precision` is 0, must satisfy
/// the constraint exactly. Otherwise equality is a Gaussian band of
/// standard deviation `precision` around the bound, and a violated
/// inequality costs `-1 / (2 precision^2)`.
pub fn constraint_ln_likelihood(x: f64, relation: Relation, bound: f64,
                                precision: f64, discrete: bool) -> f64 {
    if x.is_nan() {
        return f64::NEG_INFINITY;
    }
    let exact = discrete || precision == 0.;
    match relation {
        Relation::Eq if exact =>
            if approx_eq!(f64, x, bound, epsilon = 1e-9) { 0. } else { f64::NEG_INFINITY },
        Relation::Eq => {
            let z = (x - bound) / precision;
            -0.5 * z * z - precision.ln() - 0.5 * (2. * std::f64::consts::PI).ln()
        },
        _ if relation.holds(x, bound) => 0.,
        _ if exact => f64::NEG_INFINITY,
        _ => -0.5 / (precision * precision),
    }
}

impl ModelGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Resolved parameter bindings of node `name`.
    pub fn bindings(&self, name: &str) -> Option<&[(&'static str, Binding)]> {
        self.node(name).map(|n| n.params.as_slice())
    }

    /// Step method assigned to each node, in node order.
    pub fn step_methods(&self) -> Vec<(&str, StepMethod)> {
        self.nodes.iter().map(|n| (n.name.as_str(), n.step)).collect()
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Nodes passed to the transformation.
    pub fn args(&self) -> &[usize] {
        &self.args
    }

    /// Node index of each input, in declaration order.
    pub fn declaration_order(&self) -> &[usize] {
        &self.declaration
    }

    pub fn observations(&self) -> &[BoundObservation] {
        &self.observations
    }

    /// Whether sampling targets a posterior rather than the prior.
    pub fn is_conditioned(&self) -> bool {
        !self.observations.is_empty()
    }

    /// Secret nodes on which no output can depend: hyper-parameters none
    /// of whose descendants is passed to the transformation.
    pub fn unreachable_secrets(&self) -> Vec<&str> {
        let mut reachable = vec![false; self.nodes.len()];
        // Children always come after their parents.
        for i in (0..self.nodes.len()).rev() {
            let node = &self.nodes[i];
            reachable[i] = !node.hyper || node.children.iter().any(|&c| reachable[c]);
        }
        self.nodes.iter().zip(reachable)
            .filter(|(n, r)| n.role == Role::Secret && !r)
            .map(|(n, _)| n.name.as_str())
            .collect()
    }

    /// Distribution of `element` of `node`, given the values of its
    /// parents in `state`.
    pub fn resolve(&self, node: usize, element: usize, state: &[Vec<f64>])
            -> Result<Cow<Dist>, InvalidParameterError> {
        let n = &self.nodes[node];
        if let Some(dist) = &n.fixed {
            return Ok(Cow::Borrowed(dist));
        }
        let mut values = Vec::with_capacity(n.params.len());
        let mut probs = None;
        for (_, binding) in &n.params {
            match binding {
                Binding::Value(x) => values.push(*x),
                Binding::Probs(p) => {
                    values.push(0.);
                    probs = Some(p.as_slice());
                },
                Binding::Node(j) => {
                    let parent = &state[*j];
                    values.push(if parent.len() == 1 { parent[0] } else { parent[element] });
                },
            }
        }
        Dist::build(n.kind, &values, probs)
            .map(Cow::Owned)
            .map_err(|f| f.at(&n.name, n.kind))
    }

    /// Ancestral draw of every node from the prior.
    pub fn sample_prior<R: Rng + ?Sized>(&self, rng: &mut R)
            -> Result<State, InvalidParameterError> {
        let mut state: State = Vec::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.iter().enumerate() {
            let mut values = Vec::with_capacity(node.width);
            for e in 0..node.width {
                let sampler = self.resolve(i, e, &state)?
                                  .sampler()
                                  .map_err(|f| f.at(&node.name, node.kind))?;
                values.push(sampler.sample(rng));
            }
            state.push(values);
        }
        Ok(state)
    }

    /// Log prior density of one element of a node.
    pub fn ln_prior_element(&self, node: usize, element: usize, state: &[Vec<f64>]) -> f64 {
        match self.resolve(node, element, state) {
            Ok(dist) => dist.ln_density(state[node][element]),
            Err(_) => f64::NEG_INFINITY,
        }
    }

    /// Log prior density of all the elements of a node.
    pub fn ln_prior_node(&self, node: usize, state: &[Vec<f64>]) -> f64 {
        (0..self.nodes[node].width).map(|e| self.ln_prior_element(node, e, state)).sum()
    }

    /// Runs the transformation on the current values of the inputs.
    pub fn evaluate(&self, state: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, GraphCompilationError> {
        let args = self.args.iter()
            .map(|&i| if self.nodes[i].scalar {
                     Value::Scalar(state[i][0])
                 } else {
                     Value::Vector(state[i].clone())
                 })
            .collect::<Vec<_>>();

        let values = (self.transformation)(&args)?;
        if values.len() != self.outputs.len() {
            return Err(GraphCompilationError::OutputCount {
                expected: self.outputs.len(),
                found: values.len(),
            });
        }
        self.outputs.iter().zip(values)
            .map(|(spec, value)| {
                if value.len() != spec.width {
                    return Err(GraphCompilationError::OutputShape {
                        output: spec.name.clone(),
                        expected: spec.width,
                        found: value.len(),
                    });
                }
                Ok(match value {
                    Value::Scalar(x) => vec![x],
                    Value::Vector(v) => v,
                })
            })
            .collect()
    }

    /// Log-likelihood of the observations, given node values and outputs.
    pub fn ln_likelihood(&self, state: &[Vec<f64>], outputs: &[Vec<f64>]) -> f64 {
        let mut total = 0.;
        for obs in &self.observations {
            let (values, element) = match obs.site {
                Site::Input { node, element } => (&state[node], element),
                Site::Output { output, element } => (&outputs[output], element),
            };
            let selected = match element {
                Some(e) => &values[e..e + 1],
                None => &values[..],
            };
            for &x in selected {
                for &(relation, bound) in &obs.constraints {
                    total += constraint_ln_likelihood(x, relation, bound,
                                                      obs.precision, obs.discrete);
                }
            }
        }
        total
    }

    // Runs the transformation once on a prior draw.
    fn probe(&self) -> Result<(), GraphCompilationError> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(PROBE_SEED);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sample_prior(&mut rng) {
                Ok(state) => return self.evaluate(&state).map(|_| ()),
                // A hyper-parameter draw may make a child's parameters
                // invalid; try another one.
                Err(e) if attempt >= PROBE_ATTEMPTS => return Err(e.into()),
                Err(_) => continue,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::RandomVariable;
    use crate::error::TransformError;
    use crate::program::{Dataset, Observation};

    fn identity(v: &[Value]) -> Result<Vec<Value>, TransformError> {
        Ok(vec![v[0].clone()])
    }

    fn total(v: &[Value]) -> Result<Vec<Value>, TransformError> {
        Ok(vec![Value::from(v[0].as_slice().iter().sum::<f64>())])
    }

    fn program(dataset: Dataset) -> Program {
        Program::new("test", dataset, OutputSpec::float("out"), total)
    }

    #[test]
    fn hyper_parameters_come_first() {
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("x", Param::var("mu"), Param::var("sd")).unwrap())
            .public(RandomVariable::uniform("a", 0., 1.).unwrap())
            .public(RandomVariable::uniform("sd", 1., 2.).unwrap().hyper())
            .public(RandomVariable::normal("mu", 0., 1.).unwrap().hyper());
        let graph = compile(&program(dataset)).unwrap();

        assert_eq!(graph.node_names(), vec!["a", "sd", "mu", "x"]);
        assert_eq!(graph.bindings("x").unwrap(),
                   &[("mu", Binding::Node(2)), ("std", Binding::Node(1))][..]);
        assert_eq!(graph.node("sd").unwrap().children, vec![3]);
        // `x` and `a` are passed to the transformation, in declaration order.
        assert_eq!(graph.args(), &[3, 0]);
        assert_eq!(graph.declaration_order(), &[3, 0, 1, 2]);
    }

    #[test]
    fn compilation_is_deterministic() {
        let dataset = || Dataset::new()
            .secret(RandomVariable::binomial("x", 10, Param::var("p")).unwrap())
            .public(RandomVariable::beta("p", 2., 2.).unwrap().hyper())
            .public(RandomVariable::poisson("y", 3.).unwrap().with_elements(3).unwrap());
        let a = compile(&program(dataset())).unwrap();
        let b = compile(&program(dataset())).unwrap();
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.node_names(), b.node_names());
    }

    #[test]
    fn cycles_are_detected() {
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("a", Param::var("b"), 1.).unwrap())
            .public(RandomVariable::normal("c", 0., 1.).unwrap())
            .public(RandomVariable::normal("b", Param::var("a"), 1.).unwrap());
        assert_eq!(compile(&program(dataset)).unwrap_err(),
                   GraphCompilationError::Cycle(vec!["a".to_owned(), "b".to_owned()]));

        let dataset = Dataset::new()
            .secret(RandomVariable::normal("a", Param::var("a"), 1.).unwrap());
        assert_eq!(compile(&program(dataset)).unwrap_err(),
                   GraphCompilationError::Cycle(vec!["a".to_owned()]));
    }

    #[test]
    fn unresolved_and_duplicate_names() {
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("a", Param::var("nope"), 1.).unwrap());
        match compile(&program(dataset)).unwrap_err() {
            GraphCompilationError::UnresolvedReference { variable, param, target } => {
                assert_eq!((variable.as_str(), param.as_str(), target.as_str()),
                           ("a", "mu", "nope"));
            },
            e => panic!("unexpected error {:?}", e),
        }

        let dataset = Dataset::new()
            .secret(RandomVariable::normal("a", 0., 1.).unwrap())
            .public(RandomVariable::normal("a", 0., 1.).unwrap());
        assert_eq!(compile(&program(dataset)).unwrap_err(),
                   GraphCompilationError::DuplicateVariable("a".to_owned()));

        let dataset = Dataset::new()
            .secret(RandomVariable::normal("out", 0., 1.).unwrap());
        assert_eq!(compile(&program(dataset)).unwrap_err(),
                   GraphCompilationError::DuplicateVariable("out".to_owned()));
    }

    #[test]
    fn broadcasting() {
        let vector = |name: &str, n: usize| RandomVariable::normal(name, 0., 1.).unwrap()
                                                .with_elements(n).unwrap();
        let child = |n: usize| RandomVariable::normal("x", Param::var("mu"), 1.).unwrap()
                                   .with_elements(n).unwrap();

        let ok = Dataset::new().secret(child(4)).public(vector("mu", 4).hyper());
        assert!(compile(&program(ok)).is_ok());
        let ok = Dataset::new().secret(child(4)).public(vector("mu", 1).hyper());
        assert!(compile(&program(ok)).is_ok());

        let bad = Dataset::new().secret(child(4)).public(vector("mu", 3).hyper());
        match compile(&program(bad)).unwrap_err() {
            GraphCompilationError::NotBroadcastable { found, expected, .. } =>
                assert_eq!((found, expected), (3, 4)),
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn probe_checks_the_transformation() {
        let dataset = || Dataset::new().secret(RandomVariable::normal("x", 0., 1.).unwrap());

        let failing = Program::new("p", dataset(), OutputSpec::float("out"),
                                   |_: &[Value]| Err(TransformError::from("boom")));
        assert_eq!(compile(&failing).unwrap_err(),
                   GraphCompilationError::Transformation(TransformError::from("boom")));

        let too_many = Program::new("p", dataset(), OutputSpec::float("out"),
                                    |v: &[Value]| Ok(vec![v[0].clone(), v[0].clone()]));
        assert_eq!(compile(&too_many).unwrap_err(),
                   GraphCompilationError::OutputCount { expected: 1, found: 2 });

        let wide = Program::new("p", dataset(), OutputSpec::float("out").with_width(2),
                                identity);
        assert_eq!(compile(&wide).unwrap_err(),
                   GraphCompilationError::OutputShape { output: "out".to_owned(),
                                                        expected: 2, found: 1 });
    }

    #[test]
    fn invalid_hyper_draws_are_retried_by_the_probe() {
        // Half of the prior draws of `sd` are negative.
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("x", 0., Param::var("sd")).unwrap())
            .public(RandomVariable::normal("sd", 0., 1.).unwrap().hyper());
        assert!(compile(&program(dataset)).is_ok());
    }

    #[test]
    fn step_method_table() {
        let dataset = Dataset::new()
            .secret(RandomVariable::bernoulli("b", 0.5).unwrap())
            .secret(RandomVariable::categorical("c", vec![1., 2.]).unwrap())
            .secret(RandomVariable::poisson("p", 2.).unwrap())
            .secret(RandomVariable::normal("n", 0., 1.).unwrap())
            .public(RandomVariable::constant("k", 3.).unwrap());
        let graph = compile(&program(dataset)).unwrap();
        assert_eq!(graph.step_methods(),
                   vec![("b", StepMethod::BinaryGibbs), ("c", StepMethod::CategoricalGibbs),
                        ("p", StepMethod::DiscreteMetropolis), ("n", StepMethod::Metropolis),
                        ("k", StepMethod::Fixed)]);
    }

    #[test]
    fn observations_are_bound() {
        let dataset = Dataset::new()
            .secret(RandomVariable::poisson("x", 2.).unwrap().with_elements(3).unwrap());
        let p = Program::new("p", dataset, OutputSpec::int("out").with_width(3), identity);

        let graph = compile(&p.clone().add_observation("out[1] > 2", 0.5).unwrap()).unwrap();
        assert!(graph.is_conditioned());
        assert_eq!(graph.observations()[0].site,
                   Site::Output { output: 0, element: Some(1) });
        assert!(graph.observations()[0].discrete);

        let graph = compile(&p.clone().observe(Observation::equals("x", 1., 0.).unwrap()))
                        .unwrap();
        assert!(graph.node("x").unwrap().observed);

        for bad in &["out[3] > 2", "y > 2"] {
            let err = compile(&p.clone().add_observation(bad, 0.5).unwrap()).unwrap_err();
            assert!(matches!(err, GraphCompilationError::UnknownObservationTarget(_)));
        }
    }

    #[test]
    fn unreachable_secrets() {
        let dataset = Dataset::new()
            .secret(RandomVariable::uniform("unused", 0., 1.).unwrap().hyper())
            .secret(RandomVariable::uniform("mu", 0., 1.).unwrap().hyper())
            .secret(RandomVariable::normal("x", Param::var("mu"), 1.).unwrap());
        let graph = compile(&program(dataset)).unwrap();
        assert_eq!(graph.unreachable_secrets(), vec!["unused"]);
    }

    #[test]
    fn likelihood_policy() {
        // Exact for discrete targets and zero precision.
        assert_eq!(constraint_ln_likelihood(4., Relation::Eq, 4., 0.1, true), 0.);
        assert_eq!(constraint_ln_likelihood(4.5, Relation::Eq, 4., 0.1, true),
                   f64::NEG_INFINITY);
        assert_eq!(constraint_ln_likelihood(3., Relation::Gt, 5., 0., false),
                   f64::NEG_INFINITY);
        // Banded otherwise.
        let at = constraint_ln_likelihood(4., Relation::Eq, 4., 0.5, false);
        let off = constraint_ln_likelihood(4.5, Relation::Eq, 4., 0.5, false);
        assert!(approx_eq!(f64, at - off, 0.5, epsilon = 1e-12));
        assert_eq!(constraint_ln_likelihood(6., Relation::Gt, 5., 0.5, false), 0.);
        assert_eq!(constraint_ln_likelihood(4., Relation::Gt, 5., 0.5, false), -2.);
    }

    #[test]
    fn prior_draws_respect_bindings() {
        let dataset = Dataset::new()
            .secret(RandomVariable::uniform("x", Param::var("lo"), 10.).unwrap()
                        .with_elements(5).unwrap())
            .public(RandomVariable::discrete_uniform("lo", 5, 8).unwrap().hyper());
        let graph = compile(&program(dataset)).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        for _ in 0..100 {
            let state = graph.sample_prior(&mut rng).unwrap();
            let lo = state[0][0];
            assert!(state[1].iter().all(|x| *x >= lo && *x < 10.));
            assert!(graph.ln_prior_node(1, &state).is_finite());
        }
    }
}
