//! Metropolis-within-Gibbs chains over a model graph.
//!
//! Every sweep visits each element of each node once, in topological
//! order, with the step method chosen at compile time. The chain caches
//! the log-prior term of every element, the outputs of the
//! transformation and the log-likelihood of the observations; a move on
//! element `e` of node `i` only recomputes the terms that depend on it:
//! its own prior term, the prior terms of its children, and the
//! likelihood (re-running the transformation when `i` is one of its
//! arguments).
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::warn;

use super::diagnostics::SamplerDivergenceWarning;
use crate::distributions::Dist;
use crate::error::InferenceError;
use crate::transformer::{ModelGraph, State, StepMethod};

/// Iterations between two adaptations of the step scales.
pub const TUNE_INTERVAL: usize = 100;
/// Warnings kept per chain; further divergences are only counted.
pub const MAX_WARNINGS: usize = 10;

const MIN_SCALE: f64 = 1e-8;
const MAX_SCALE: f64 = 1e8;

// Terms affected by a move.
struct Terms {
    own: f64,
    children: Vec<Vec<f64>>,
    outputs: Option<Vec<Vec<f64>>>,
    ln_like: f64,
}

impl Terms {
    fn total(&self) -> f64 {
        self.own + self.children.iter().flatten().sum::<f64>() + self.ln_like
    }
}

/// State of one chain.
pub struct Chain<'a> {
    graph: &'a ModelGraph,
    id: usize,
    iteration: usize,
    state: State,
    ln_prior: Vec<Vec<f64>>,
    outputs: Vec<Vec<f64>>,
    ln_like: f64,
    is_arg: Vec<bool>,
    scales: Vec<f64>,
    // (accepted, proposed) since the last adaptation.
    window: Vec<(usize, usize)>,
    accepted: usize,
    proposed: usize,
    divergences: usize,
    warnings: Vec<SamplerDivergenceWarning>,
}

impl<'a> Chain<'a> {
    /// Starts a chain from the first prior draw with finite posterior
    /// density.
    pub fn init<R: Rng + ?Sized>(graph: &'a ModelGraph, id: usize, rng: &mut R,
                                 max_attempts: usize) -> Result<Chain<'a>, InferenceError> {
        for _ in 0..max_attempts {
            let state = match graph.sample_prior(rng) {
                Ok(state) => state,
                Err(_) => continue,
            };
            let outputs = match graph.evaluate(&state) {
                Ok(outputs) => outputs,
                Err(_) => continue,
            };
            let ln_prior = (0..state.len())
                .map(|i| (0..state[i].len())
                             .map(|e| graph.ln_prior_element(i, e, &state))
                             .collect::<Vec<_>>())
                .collect::<Vec<_>>();
            let ln_like = graph.ln_likelihood(&state, &outputs);
            if !ln_like.is_finite() || ln_prior.iter().flatten().any(|x| !x.is_finite()) {
                continue;
            }

            let n = state.len();
            let mut is_arg = vec![false; n];
            for &a in graph.args() {
                is_arg[a] = true;
            }
            return Ok(Chain {
                graph,
                id,
                iteration: 0,
                state,
                ln_prior,
                outputs,
                ln_like,
                is_arg,
                scales: vec![1.; n],
                window: vec![(0, 0); n],
                accepted: 0,
                proposed: 0,
                divergences: 0,
                warnings: Vec::new(),
            });
        }
        Err(InferenceError::NoValidSample { chain: id, attempts: max_attempts })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn outputs(&self) -> &[Vec<f64>] {
        &self.outputs
    }

    /// One update of every element of every node. Acceptance statistics
    /// only count once `tuning` is over.
    pub fn sweep<R: Rng + ?Sized>(&mut self, rng: &mut R, tuning: bool) {
        self.iteration += 1;
        let graph = self.graph;
        for (i, node) in graph.nodes().iter().enumerate() {
            for e in 0..node.width {
                let accepted = match node.step {
                    StepMethod::Fixed => continue,
                    StepMethod::CategoricalGibbs => self.gibbs(i, e, rng),
                    StepMethod::BinaryGibbs => {
                        let flipped = 1. - self.state[i][e];
                        self.metropolis(i, e, flipped, rng)
                    },
                    StepMethod::DiscreteMetropolis => {
                        let z: f64 = rng.sample(StandardNormal);
                        let mut step = (self.scales[i] * z).round();
                        if step == 0. {
                            step = if rng.gen::<bool>() { 1. } else { -1. };
                        }
                        let proposal = self.state[i][e] + step;
                        self.metropolis(i, e, proposal, rng)
                    },
                    StepMethod::Metropolis => {
                        let z: f64 = rng.sample(StandardNormal);
                        let proposal = self.state[i][e] + self.scales[i] * z;
                        self.metropolis(i, e, proposal, rng)
                    },
                };
                self.window[i].1 += 1;
                if accepted {
                    self.window[i].0 += 1;
                }
                if !tuning {
                    self.proposed += 1;
                    if accepted {
                        self.accepted += 1;
                    }
                }
            }
        }
    }

    /// Adapts the step scales to the acceptance rate of the last window.
    pub fn tune(&mut self) {
        for (scale, window) in self.scales.iter_mut().zip(self.window.iter_mut()) {
            let (accepted, proposed) = *window;
            if proposed > 0 {
                *scale = tuned(*scale, accepted as f64 / proposed as f64);
            }
            *window = (0, 0);
        }
    }

    /// Acceptance rate after tuning, divergences and kept warnings.
    pub fn finish(self) -> (f64, usize, Vec<SamplerDivergenceWarning>) {
        let rate = if self.proposed == 0 {
            0.
        } else {
            self.accepted as f64 / self.proposed as f64
        };
        (rate, self.divergences, self.warnings)
    }

    // Metropolis-Hastings with a symmetric proposal.
    fn metropolis<R: Rng + ?Sized>(&mut self, i: usize, e: usize, value: f64,
                                   rng: &mut R) -> bool {
        let current = self.local_total(i, e);
        let old = self.state[i][e];
        self.state[i][e] = value;
        let terms = match self.local_terms(i, e) {
            Ok(terms) => terms,
            Err(reason) => {
                self.state[i][e] = old;
                self.diverge(i, reason);
                return false;
            },
        };
        let total = terms.total();
        if total.is_nan() || total == f64::INFINITY {
            self.state[i][e] = old;
            self.diverge(i, format!("log density evaluates to {}", total));
            return false;
        }

        let ln_ratio = total - current;
        if ln_ratio >= 0. || rng.gen::<f64>().ln() < ln_ratio {
            self.commit(i, e, terms);
            true
        } else {
            self.state[i][e] = old;
            false
        }
    }

    // Exact draw from the full conditional over the categories.
    fn gibbs<R: Rng + ?Sized>(&mut self, i: usize, e: usize, rng: &mut R) -> bool {
        let categories = match self.graph.resolve(i, e, &self.state).as_deref() {
            Ok(Dist::Categorical { p }) => p.len(),
            _ => return false,
        };
        let old = self.state[i][e];

        let mut candidates = Vec::with_capacity(categories);
        for k in 0..categories {
            self.state[i][e] = k as f64;
            match self.local_terms(i, e) {
                Ok(terms) => {
                    let total = terms.total();
                    if total.is_nan() || total == f64::INFINITY {
                        self.diverge(i, format!("log density evaluates to {}", total));
                        candidates.push((f64::NEG_INFINITY, None));
                    } else {
                        candidates.push((total, Some(terms)));
                    }
                },
                Err(reason) => {
                    self.diverge(i, reason);
                    candidates.push((f64::NEG_INFINITY, None));
                },
            }
        }

        let max = candidates.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            self.state[i][e] = old;
            return false;
        }
        let weights = candidates.iter().map(|c| (c.0 - max).exp()).collect::<Vec<_>>();
        let mut u = rng.gen::<f64>() * weights.iter().sum::<f64>();
        let mut chosen = weights.iter().rposition(|w| *w > 0.).unwrap_or(0);
        for (k, w) in weights.iter().enumerate() {
            if u < *w {
                chosen = k;
                break;
            }
            u -= w;
        }

        match candidates.into_iter().nth(chosen).and_then(|c| c.1) {
            Some(terms) => {
                self.state[i][e] = chosen as f64;
                self.commit(i, e, terms);
                true
            },
            None => {
                self.state[i][e] = old;
                false
            },
        }
    }

    fn local_total(&self, i: usize, e: usize) -> f64 {
        let children = self.graph.nodes()[i].children.iter()
            .map(|&c| self.ln_prior[c].iter().sum::<f64>())
            .sum::<f64>();
        self.ln_prior[i][e] + children + self.ln_like
    }

    // Terms depending on element `e` of node `i`, at the current state.
    fn local_terms(&self, i: usize, e: usize) -> Result<Terms, String> {
        let graph = self.graph;
        let own = graph.ln_prior_element(i, e, &self.state);
        if own == f64::NEG_INFINITY {
            return Ok(Terms { own, children: Vec::new(), outputs: None, ln_like: self.ln_like });
        }
        let children = graph.nodes()[i].children.iter()
            .map(|&c| (0..self.state[c].len())
                         .map(|k| graph.ln_prior_element(c, k, &self.state))
                         .collect::<Vec<_>>())
            .collect();
        let outputs = if self.is_arg[i] {
            Some(graph.evaluate(&self.state).map_err(|e| e.to_string())?)
        } else {
            None
        };
        let ln_like = if outputs.is_some() || graph.nodes()[i].observed {
            graph.ln_likelihood(&self.state, outputs.as_ref().unwrap_or(&self.outputs))
        } else {
            self.ln_like
        };
        Ok(Terms { own, children, outputs, ln_like })
    }

    fn commit(&mut self, i: usize, e: usize, terms: Terms) {
        self.ln_prior[i][e] = terms.own;
        for (&c, values) in self.graph.nodes()[i].children.iter().zip(terms.children) {
            self.ln_prior[c] = values;
        }
        if let Some(outputs) = terms.outputs {
            self.outputs = outputs;
        }
        self.ln_like = terms.ln_like;
    }

    fn diverge(&mut self, i: usize, reason: String) {
        self.divergences += 1;
        if self.warnings.len() < MAX_WARNINGS {
            let variable = self.graph.nodes()[i].name.clone();
            warn!(chain = self.id, iteration = self.iteration, variable = %variable,
                  reason = %reason, "sampler divergence");
            self.warnings.push(SamplerDivergenceWarning {
                chain: self.id,
                iteration: self.iteration,
                variable,
                reason,
            });
        }
    }
}

/// Scale adaptation: shrink when too few proposals are accepted, grow
/// when too many are.
fn tuned(scale: f64, acceptance: f64) -> f64 {
    let factor = if acceptance < 0.001 {
        0.1
    } else if acceptance < 0.05 {
        0.5
    } else if acceptance < 0.2 {
        0.9
    } else if acceptance > 0.95 {
        10.
    } else if acceptance > 0.75 {
        2.
    } else if acceptance > 0.5 {
        1.1
    } else {
        1.
    };
    (scale * factor).max(MIN_SCALE).min(MAX_SCALE)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use crate::distributions::RandomVariable;
    use crate::program::{Dataset, OutputSpec, Program, Value};
    use crate::transformer::compile;

    #[test]
    fn scale_adaptation() {
        assert_eq!(tuned(1., 0.), 0.1);
        assert_eq!(tuned(1., 0.3), 1.);
        assert_eq!(tuned(1., 0.99), 10.);
        assert_eq!(tuned(MAX_SCALE, 0.99), MAX_SCALE);
    }

    #[test]
    fn cached_terms_stay_consistent() {
        let dataset = Dataset::new()
            .secret(RandomVariable::normal("x", 0., 1.).unwrap().with_elements(3).unwrap())
            .public(RandomVariable::poisson("k", 3.).unwrap());
        let program = Program::new("p", dataset, OutputSpec::float("s"), |v: &[Value]| {
            Ok(vec![Value::from(v[0].as_slice().iter().sum::<f64>() + v[1].scalar()?)])
        }).add_observation("s == 4", 1.).unwrap();
        let graph = compile(&program).unwrap();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let mut chain = Chain::init(&graph, 0, &mut rng, 100).unwrap();
        for _ in 0..50 {
            chain.sweep(&mut rng, false);
        }
        let fresh = graph.evaluate(chain.state()).unwrap();
        assert_eq!(chain.outputs(), &fresh[..]);
        for i in 0..graph.nodes().len() {
            let prior = graph.ln_prior_node(i, chain.state());
            assert!((chain.ln_prior[i].iter().sum::<f64>() - prior).abs() < 1e-9);
        }
        let (rate, divergences, _) = chain.finish();
        assert!(rate > 0. && rate < 1.);
        assert_eq!(divergences, 0);
    }
}
