//! Mutual information between a continuous and a discrete random
//! variable, following Ross [1].
//!
//! For each sample `i` with label `l`, `d` is the distance to its `k`-th
//! neighbor among the samples with the same label, and `m_i` the number of
//! samples (of any label, itself included) strictly closer than `d`:
//!
//! ```text
//! I = psi(N) + < psi(k) > - < psi(N_l) > - < psi(m_i) >
//! ```
//!
//! where `N_l` is the number of samples labelled `l`. Samples whose label
//! appears only once are ignored; `k` is capped at `N_l - 1`.
//!
//! # References
//! [1] B. C. Ross, "Mutual Information between Discrete and Continuous
//!     Data Sets". PLoS ONE 9(2), 2014.
use std::collections::HashMap;
use itertools::Itertools;
use ndarray::prelude::*;
use rayon::prelude::*;
use statrs::function::gamma::digamma;

use super::neighbors::PointSet;

/// Ross estimate, in nats. `labels` has one entry per row of `c`.
pub fn ross(c: &ArrayView2<f64>, labels: &[usize], k: usize) -> f64 {
    let groups: HashMap<usize, Vec<usize>> = labels.iter()
                                                   .enumerate()
                                                   .map(|(i, l)| (*l, i))
                                                   .into_group_map();

    let mut radius = vec![0.; labels.len()];
    let mut k_all = vec![0; labels.len()];
    for rows in groups.values().filter(|rows| rows.len() > 1) {
        let kk = k.min(rows.len() - 1);
        let group = c.select(Axis(0), rows);
        let set = PointSet::new(group.view());
        for (pos, &i) in rows.iter().enumerate() {
            radius[i] = set.kth_neighbor_distance(pos, kk);
            k_all[i] = kk;
        }
    }

    // Ignore samples with unique labels.
    let kept = (0..labels.len())
        .filter(|i| groups[&labels[*i]].len() > 1)
        .collect::<Vec<_>>();
    let n = kept.len();
    if n == 0 {
        return 0.;
    }
    let points = c.select(Axis(0), &kept);
    let set = PointSet::new(points.view());

    let terms = (0..n).into_par_iter()
        .map(|pos| {
            let i = kept[pos];
            let m = set.count_within(pos, radius[i]) + 1;
            digamma(k_all[i] as f64)
                - digamma(groups[&labels[i]].len() as f64)
                - digamma(m as f64)
        })
        .collect::<Vec<_>>();

    digamma(n as f64) + terms.iter().sum::<f64>() / n as f64
}
