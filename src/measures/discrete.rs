//! Plug-in estimate of the mutual information between two discrete
//! random variables: I(X; Y) = H(X) + H(Y) - H(X, Y), with entropies of
//! the empirical distributions.
use std::collections::HashMap;
use std::hash::Hash;

/// Empirical entropy, in nats, of a sequence of symbols.
pub fn entropy<T, I>(symbols: I) -> f64
        where T: Hash + Eq, I: IntoIterator<Item = T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut n = 0;
    for s in symbols {
        *counts.entry(s).or_insert(0) += 1;
        n += 1;
    }
    if n == 0 {
        return 0.;
    }
    let n = n as f64;
    counts.values()
          .map(|&c| { let p = c as f64 / n; -p * p.ln() })
          .sum()
}

/// Plug-in estimate, in nats. `x` and `y` are index-aligned ids.
pub fn plug_in(x: &[usize], y: &[usize]) -> f64 {
    entropy(x.iter()) + entropy(y.iter()) - entropy(x.iter().zip(y.iter()))
}
