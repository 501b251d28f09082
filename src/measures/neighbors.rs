//! Nearest-neighbor queries under the max-norm.
//!
//! Points are kept sorted by their first coordinate. Since the max-norm
//! distance between two points is at least the gap between their first
//! coordinates, searches walk outwards from the query point and stop as
//! soon as that gap exceeds the current search radius.
use std::collections::BinaryHeap;
use ndarray::prelude::*;
use ordered_float::OrderedFloat;

/// Max-norm distance between two vectors.
pub fn chebyshev_distance(v1: &ArrayView1<f64>, v2: &ArrayView1<f64>) -> f64 {
    v1.iter()
      .zip(v2.iter())
      .map(|(x, y)| (x - y).abs())
      .fold(0., f64::max)
}

/// Rows of a matrix, indexed for neighbor queries.
#[derive(Debug)]
pub struct PointSet<'a> {
    points: ArrayView2<'a, f64>,
    // Rows sorted by their first coordinate.
    order: Vec<usize>,
    // Position of each row in `order`.
    rank: Vec<usize>,
}

impl<'a> PointSet<'a> {
    pub fn new(points: ArrayView2<'a, f64>) -> PointSet<'a> {
        let mut order = (0..points.nrows()).collect::<Vec<_>>();
        if points.ncols() > 0 {
            order.sort_by_key(|&i| OrderedFloat::from(points[[i, 0]]));
        }
        let mut rank = vec![0; order.len()];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        PointSet { points, order, rank }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn first(&self, i: usize) -> f64 {
        if self.points.ncols() == 0 { 0. } else { self.points[[i, 0]] }
    }

    fn distance(&self, i: usize, j: usize) -> f64 {
        chebyshev_distance(&self.points.row(i), &self.points.row(j))
    }

    /// Walks the rows other than `i` by increasing gap on the first
    /// coordinate, calling `visit(j, gap)` until it returns false.
    fn walk<F>(&self, i: usize, mut visit: F)
            where F: FnMut(usize, f64) -> bool {
        let x0 = self.first(i);
        let pos = self.rank[i];
        // Next candidates are order[left - 1] and order[right].
        let mut left = pos;
        let mut right = pos + 1;
        loop {
            let gap_left = if left > 0 { Some(x0 - self.first(self.order[left - 1])) }
                           else { None };
            let gap_right = if right < self.order.len() {
                Some(self.first(self.order[right]) - x0)
            } else {
                None
            };
            let (j, gap) = match (gap_left, gap_right) {
                (None, None) => return,
                (Some(l), Some(r)) if l <= r => {
                    left -= 1;
                    (self.order[left], l)
                },
                (Some(l), None) => {
                    left -= 1;
                    (self.order[left], l)
                },
                (_, Some(r)) => {
                    right += 1;
                    (self.order[right - 1], r)
                },
            };
            if !visit(j, gap) {
                return;
            }
        }
    }

    /// Distance from row `i` to its `k`-th nearest other row; infinite
    /// if there are fewer than `k` other rows.
    pub fn kth_neighbor_distance(&self, i: usize, k: usize) -> f64 {
        if k == 0 {
            return 0.;
        }
        // Distances of the k nearest rows seen so far; the furthest on top.
        let mut heap: BinaryHeap<OrderedFloat<f64>> = BinaryHeap::with_capacity(k + 1);
        self.walk(i, |j, gap| {
            if heap.len() == k {
                // The furthest kept neighbor.
                let worst = heap.peek().map_or(f64::INFINITY, |d| d.into_inner());
                if gap >= worst {
                    return false;
                }
                let distance = self.distance(i, j);
                if distance < worst {
                    heap.pop();
                    heap.push(OrderedFloat::from(distance));
                }
            } else {
                heap.push(OrderedFloat::from(self.distance(i, j)));
            }
            true
        });
        if heap.len() < k {
            return f64::INFINITY;
        }
        heap.peek().map_or(f64::INFINITY, |d| d.into_inner())
    }

    /// Number of rows other than `i` strictly closer than `radius` to it.
    pub fn count_within(&self, i: usize, radius: f64) -> usize {
        let mut count = 0;
        self.walk(i, |j, gap| {
            if gap >= radius {
                return false;
            }
            if self.distance(i, j) < radius {
                count += 1;
            }
            true
        });
        count
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn brute_kth(points: &Array2<f64>, i: usize, k: usize) -> f64 {
        let mut d = (0..points.nrows())
            .filter(|&j| j != i)
            .map(|j| chebyshev_distance(&points.row(i), &points.row(j)))
            .collect::<Vec<_>>();
        d.sort_by(|a, b| a.partial_cmp(b).unwrap());
        d[k - 1]
    }

    #[test]
    fn matches_brute_force() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let points = Array::from_shape_fn((200, 3), |_| rng.gen::<f64>());
        let set = PointSet::new(points.view());
        for i in 0..points.nrows() {
            for &k in &[1, 3, 10] {
                let eps = set.kth_neighbor_distance(i, k);
                assert_eq!(eps, brute_kth(&points, i, k));
                let brute = (0..points.nrows())
                    .filter(|&j| j != i
                            && chebyshev_distance(&points.row(i), &points.row(j)) < eps)
                    .count();
                assert_eq!(set.count_within(i, eps), brute);
                assert_eq!(brute, k - 1);
            }
        }
    }

    #[test]
    fn small_sets() {
        let points = array![[0.], [1.], [3.], [3.]];
        let set = PointSet::new(points.view());
        assert_eq!(set.kth_neighbor_distance(0, 1), 1.);
        assert_eq!(set.kth_neighbor_distance(0, 3), 3.);
        assert_eq!(set.kth_neighbor_distance(0, 4), f64::INFINITY);
        // Ties at distance 0.
        assert_eq!(set.kth_neighbor_distance(2, 1), 0.);
        assert_eq!(set.count_within(1, 2.), 1);
        assert_eq!(set.count_within(1, 2.5), 3);
    }
}
