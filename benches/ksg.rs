#[macro_use]
extern crate bencher;

use bencher::Bencher;
use ndarray::prelude::*;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

use privug::measures::ksg::ksg;
use privug::measures::{mutual_information, EstimatorParams, Samples};


/// Correlated Gaussian samples: y = x + noise.
///
/// This dataset only serves for benchmark purposes.
fn correlated(n: usize) -> (Array2<f64>, Array2<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
    let normal = Normal::new(0., 1.).unwrap();
    let x = Array::from_shape_simple_fn((n, 1), || normal.sample(&mut rng));
    let noise = Array::from_shape_simple_fn((n, 1), || normal.sample(&mut rng));
    let y = &x + &noise;
    (x, y)
}

fn bench_ksg(b: &mut Bencher) {
    let (x, y) = correlated(2000);

    b.iter(|| ksg(&x.view(), &y.view(), 20));
}

fn bench_mutual_information_mixed(b: &mut Bencher) {
    let (x, y) = correlated(2000);
    let labels = x.mapv(|v| if v > 0. { 1. } else { 0. });
    let secret = Samples::new(labels, true);
    let output = Samples::new(y, false);
    let params = EstimatorParams::default();

    b.iter(|| mutual_information(&secret, &output, &params)
                 .expect("Failed to estimate mutual information"));
}

benchmark_group!(benches, bench_ksg, bench_mutual_information_mixed);
benchmark_main!(benches);
