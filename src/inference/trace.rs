//! Sample traces produced by the inference engine.
use ndarray::prelude::*;
use ndarray::concatenate;
use serde::{Deserialize, Serialize};

use super::diagnostics::Diagnostics;
use crate::program::split_index;

/// What a traced variable is in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRole {
    Secret,
    Public,
    Output,
}

/// Metadata of a traced variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub width: usize,
    pub scalar: bool,
    pub discrete: bool,
    pub hyper: bool,
    pub role: VarRole,
    /// Some output may depend on the variable.
    pub reachable: bool,
}

/// Samples of every input and output, per chain.
///
/// Variables are kept in declaration order, inputs first. Each chain
/// stores, for each variable, a `(draws x width)` matrix; the `i`-th row
/// of every variable comes from the same draw, so samples of different
/// variables are index-aligned.
///
/// A trace is never modified once returned by `infer()`. It serializes
/// with `serde`, preserving names and shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorTrace {
    model: String,
    variables: Vec<VariableInfo>,
    chains: Vec<Vec<Array2<f64>>>,
    diagnostics: Diagnostics,
    conditioned: bool,
}

impl PosteriorTrace {
    pub(crate) fn new(model: String, variables: Vec<VariableInfo>,
                      chains: Vec<Vec<Array2<f64>>>, diagnostics: Diagnostics,
                      conditioned: bool) -> PosteriorTrace {
        PosteriorTrace { model, variables, chains, diagnostics, conditioned }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Position of `name` among the traced variables.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Number of draws in each chain.
    pub fn draws(&self) -> Vec<usize> {
        self.chains.iter()
            .map(|c| c.first().map_or(0, |a| a.nrows()))
            .collect()
    }

    /// Total number of draws, over all chains.
    pub fn len(&self) -> usize {
        self.draws().iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of `name` in chain `chain`.
    pub fn chain(&self, chain: usize, name: &str) -> Option<ArrayView2<f64>> {
        let v = self.position(name)?;
        self.chains.get(chain).map(|c| c[v].view())
    }

    /// Samples of `name`, chains concatenated in order.
    pub fn merged(&self, name: &str) -> Option<Array2<f64>> {
        let v = self.position(name)?;
        let views = self.chains.iter().map(|c| c[v].view()).collect::<Vec<_>>();
        concatenate(Axis(0), &views).ok()
    }

    /// Merged samples for a selector, `"name"` or `"name[i]"`, and
    /// whether they are discrete.
    pub fn samples(&self, selector: &str) -> Option<(Array2<f64>, bool)> {
        let (name, element) = split_index(selector)?;
        let info = self.variable(name)?;
        let merged = self.merged(name)?;
        match element {
            None => Some((merged, info.discrete)),
            Some(e) if e < info.width =>
                Some((merged.slice(s![.., e..e + 1]).to_owned(), info.discrete)),
            Some(_) => None,
        }
    }

    /// Per-chain draws of one element of a variable.
    pub fn element_chains(&self, name: &str, element: usize) -> Option<Vec<Vec<f64>>> {
        let v = self.position(name)?;
        if element >= self.variables[v].width {
            return None;
        }
        Some(self.chains.iter().map(|c| c[v].column(element).to_vec()).collect())
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Whether the samples come from a posterior (observations were
    /// attached) rather than the prior.
    pub fn is_conditioned(&self) -> bool {
        self.conditioned
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::diagnostics::{ChainDiagnostics, VariableDiagnostics};

    fn trace() -> PosteriorTrace {
        let variables = vec![
            VariableInfo { name: "x".to_owned(), width: 1, scalar: true, discrete: true,
                           hyper: false, role: VarRole::Secret, reachable: true },
            VariableInfo { name: "v".to_owned(), width: 2, scalar: false, discrete: false,
                           hyper: false, role: VarRole::Public, reachable: true },
            VariableInfo { name: "out".to_owned(), width: 1, scalar: true, discrete: false,
                           hyper: false, role: VarRole::Output, reachable: true },
        ];
        let chains = vec![
            vec![array![[1.], [2.]], array![[0.5, 1.5], [2.5, 3.5]], array![[9.], [8.]]],
            vec![array![[3.]], array![[4.5, 5.5]], array![[7.]]],
        ];
        let diagnostics = Diagnostics {
            variables: vec![VariableDiagnostics { name: "x".to_owned(),
                                                  r_hat: vec![Some(1.02)], ess: vec![2.] }],
            chains: vec![ChainDiagnostics { chain: 0, draws: 2, acceptance_rate: 0.4,
                                            divergences: 1, truncated: false }],
            warnings: vec![],
        };
        PosteriorTrace::new("m".to_owned(), variables, chains, diagnostics, true)
    }

    #[test]
    fn merged_views() {
        let t = trace();
        assert_eq!(t.draws(), vec![2, 1]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.merged("x").unwrap(), array![[1.], [2.], [3.]]);
        assert_eq!(t.merged("v").unwrap().dim(), (3, 2));
        assert_eq!(t.chain(1, "out").unwrap(), array![[7.]]);
        assert!(t.merged("nope").is_none());
    }

    #[test]
    fn selectors() {
        let t = trace();
        let (v1, discrete) = t.samples("v[1]").unwrap();
        assert_eq!(v1, array![[1.5], [3.5], [5.5]]);
        assert!(!discrete);
        assert!(t.samples("x").unwrap().1);
        assert!(t.samples("v[2]").is_none());
        assert_eq!(t.element_chains("v", 0).unwrap(), vec![vec![0.5, 2.5], vec![4.5]]);
    }

    #[test]
    fn serde_round_trip() {
        let t = trace();
        let json = serde_json::to_string(&t).unwrap();
        let back: PosteriorTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.variables().iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
                   vec!["x", "v", "out"]);
        assert_eq!(back.merged("v").unwrap().dim(), (3, 2));
    }
}
