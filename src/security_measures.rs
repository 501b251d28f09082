//! Definitions of security and leakage measures.
//!
//! In the documentation, we write R* to indicate the Bayes risk,
//! and G to indicate the error of random guessing (i.e., 1 - max priors).
//! The Bayes vulnerability of the secret is 1 - G before observing the
//! output, and 1 - R* after.
//!
//! # References
//! [1] M. S. Alvim et al. "Additive and multiplicative notions of leakage,
//!     and their capacities." CSF, 2014.
//! [2] G. Cherubin "Bayes, not Naïve: Security Bounds on Website
//!     Fingerprinting Defenses." PoPETS, 2017
use std::collections::HashMap;
use float_cmp::approx_eq;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use crate::measures::Units;
use crate::utils::max_prior;

/// Computes the Multiplicative Leakage, as defined in [1].
pub fn multiplicative_leakage(bayes_risk: f64, random_guessing: f64) -> f64 {
    (1. - bayes_risk) / (1. - random_guessing)
}

/// Computes the Additive Leakage, as defined in [1].
pub fn additive_leakage(bayes_risk: f64, random_guessing: f64) -> f64 {
    random_guessing - bayes_risk
}

/// Computes the Bayes security measure, as defined in [2].
///
/// Undefined (None) if the secret can be guessed without error
/// (G = 0).
pub fn bayes_security_measure(bayes_risk: f64, random_guessing: f64) -> Option<f64> {
    if approx_eq!(f64, random_guessing, 0.) {
        return None;
    }
    Some(bayes_risk / random_guessing)
}

/// Computes the Min-entropy leakage, in bits.
pub fn min_entropy_leakage(bayes_risk: f64, random_guessing: f64) -> f64 {
    - (1. - random_guessing).log2() + (1. - bayes_risk).log2()
}

/// Prior and posterior Bayes vulnerability of a discrete secret.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Probability of guessing the secret in one try, without the output.
    pub prior: f64,
    /// Probability of guessing the secret in one try, given the output.
    pub posterior: f64,
}

impl Vulnerability {
    /// Frequentist estimate from index-aligned secret and output ids.
    ///
    /// For each output value, the best guess is the most frequent
    /// secret observed with it.
    pub fn estimate(secrets: &ArrayView1<usize>, outputs: &ArrayView1<usize>)
            -> Vulnerability {
        let n = secrets.len();
        if n == 0 {
            return Vulnerability { prior: 0., posterior: 0. };
        }
        let mut joint: HashMap<(usize, usize), usize> = HashMap::new();
        for (x, y) in secrets.iter().zip(outputs.iter()) {
            *joint.entry((*y, *x)).or_insert(0) += 1;
        }
        let mut best: HashMap<usize, usize> = HashMap::new();
        for ((y, _), count) in joint {
            let b = best.entry(y).or_insert(0);
            *b = (*b).max(count);
        }
        let correct = best.values().sum::<usize>();

        Vulnerability {
            prior: max_prior(secrets),
            posterior: correct as f64 / n as f64,
        }
    }

    /// R*, the error of the best guess given the output.
    pub fn bayes_risk(&self) -> f64 {
        1. - self.posterior
    }

    /// G, the error of the best guess without the output.
    pub fn random_guessing(&self) -> f64 {
        1. - self.prior
    }

    pub fn multiplicative_leakage(&self) -> f64 {
        multiplicative_leakage(self.bayes_risk(), self.random_guessing())
    }

    pub fn additive_leakage(&self) -> f64 {
        additive_leakage(self.bayes_risk(), self.random_guessing())
    }

    pub fn bayes_security(&self) -> Option<f64> {
        bayes_security_measure(self.bayes_risk(), self.random_guessing())
    }

    /// Min-entropy leakage, `log(V_posterior / V_prior)`; never negative.
    pub fn min_entropy_leakage(&self, units: Units) -> f64 {
        if self.prior <= 0. {
            return 0.;
        }
        let bits = min_entropy_leakage(self.bayes_risk(), self.random_guessing());
        match units {
            Units::Bits => bits.max(0.),
            Units::Nats => (bits * std::f64::consts::LN_2).max(0.),
        }
    }
}
