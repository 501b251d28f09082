//! `privug` estimates the leakage of a system about its secrets in a
//! black-box manner, by only looking at samples of secret inputs and
//! respective outputs.
//!
//! # Getting started
//!
//! `privug` takes as input a CSV file of samples, such as:
//!
//!     0, 0.1, 2.43, 1.1
//!     1, 0.0, 1.22, 1.1
//!     1, 1.0, 1.02, 0.1
//!     ...
//!
//! where the first column specifies the secret, and the remaining ones
//! indicate the output vector. Each side is considered discrete if all
//! its values are integers.
//!
//! **mi** estimates the mutual information between secret and output
//! (in bits, or in nats with `--nats`). The estimator is chosen from
//! the kinds of the samples, unless `--estimator` forces one.
//!
//! **vulnerability** estimates the prior and posterior Bayes
//! vulnerability of the secret, and the leakage measures derived from
//! them.
//!
//! ## Convergence
//!
//! With `--curve=<steps>`, the estimate is repeated on growing prefixes
//! of the samples, and `privug` reports for which sample size it
//! converged: we declare convergence if an estimate did not vary more
//! than `--delta`, either in relative (default) or absolute (`--abs`)
//! value, over the last `q` sizes (where `q` is specified with
//! `--qstop`). One can specify more than one deltas as comma-separated
//! values, e.g.: `--delta=0.1,0.01,0.001`.
use docopt::Docopt;
use serde::Deserialize;
use tracing::{debug, info, Level};

use privug::error::{DataError, Error, LeakageError};
use privug::measures::convergence::{leakage_curve, linear_sizes};
use privug::measures::{mutual_information, min_samples_for, Estimator, EstimatorParams,
                       Samples, Units};
use privug::security_measures::Vulnerability;
use privug::utils::{load_samples, rows_to_ids};


const USAGE: &str = "
Estimate the leakage of a black-box system from samples.

Usage: privug mi [options] <samples>
       privug vulnerability [options] <samples>
       privug (--help | --version)

Options:
    --estimator=<e>             Mutual information estimator: auto,
                                continuous, discrete or mixed
                                [default: auto].
    --n-neigh=<k>               Neighbors for the k-NN estimators
                                [default: 20].
    --min-samples=<n>           Minimum number of samples [default: 100].
    --nats                      Report nats instead of bits.
    --seed=<s>                  Seed for the noise added to continuous
                                samples [default: 0].
    --curve=<steps>             Estimate on <steps> growing prefixes of
                                the samples, and check convergence.
    --delta=<d>                 Delta for delta covergence [default: 0.1].
                                Multiple deltas can be specified as
                                comma-separated values.
    --qstop=<q>                 Number of prefixes to declare
                                delta-convergence [default: 3].
    --abs                       Use absolute convergence instead of relative
                                convergence.
    -v, --verbose               Log progress to stderr.
    -h, --help                  Show help.
    --version                   Show the version.
";

#[derive(Deserialize)]
struct Args {
    cmd_mi: bool,
    cmd_vulnerability: bool,
    flag_estimator: String,
    flag_n_neigh: usize,
    flag_min_samples: usize,
    flag_nats: bool,
    flag_seed: u64,
    flag_curve: Option<usize>,
    flag_delta: String,
    flag_qstop: usize,
    flag_abs: bool,
    flag_verbose: bool,
    arg_samples: String,
}

/// Parses a string of deltas specified as comma-separated values.
fn parse_deltas(deltas: &str) -> Result<Vec<f64>, LeakageError> {
    deltas.split(',')
          .map(|s| s.trim().parse::<f64>().map_err(|_|
              LeakageError::InvalidParams(format!("cannot parse delta `{}`", s))))
          .collect()
}

/// Loads the samples; each side is discrete if it has integer support.
fn load(path: &str) -> Result<(Samples, Samples), DataError> {
    let (secrets, outputs) = load_samples(path)?;
    let n = secrets.len();
    let secrets = secrets.into_shape((n, 1))
                         .map_err(|_| DataError::Empty)?;
    Ok((Samples::detect(secrets), Samples::detect(outputs)))
}

fn run_mi(args: &Args, params: &EstimatorParams, secret: &Samples, output: &Samples)
        -> Result<(), Error> {
    let unit = match params.units { Units::Bits => "bits", Units::Nats => "nats" };

    if let Some(steps) = args.flag_curve {
        let deltas = parse_deltas(&args.flag_delta)?;
        let sizes = linear_sizes(min_samples_for(params), secret.len(), steps);
        let curve = leakage_curve(secret, output, params, &sizes, &deltas,
                                  args.flag_qstop, !args.flag_abs)?;

        println!("n, mi");
        for point in &curve.points {
            println!("{}, {}", point.samples, point.estimate);
        }
        for (delta, converged) in &curve.converged {
            match converged {
                Some(n) => println!("[*] {}-convergence after {} samples", delta, n),
                None => println!("[*] no {}-convergence", delta),
            }
        }
        println!();
    }

    let mi = mutual_information(secret, output, params)?;
    println!("Mutual information: {} {}", mi, unit);
    Ok(())
}

fn run_vulnerability(params: &EstimatorParams, secret: &Samples, output: &Samples)
        -> Result<(), Error> {
    if !secret.discrete || !output.discrete {
        info!("continuous samples: each distinct value is a separate symbol");
    }
    let (secret_ids, _) = rows_to_ids(secret.values.view(), None);
    let (output_ids, _) = rows_to_ids(output.values.view(), None);
    let v = Vulnerability::estimate(&secret_ids.view(), &output_ids.view());

    println!("Prior vulnerability: {}", v.prior);
    println!("Posterior vulnerability: {}", v.posterior);
    println!("Random guessing error: {}", v.random_guessing());
    println!("Bayes risk: {}", v.bayes_risk());
    println!("Multiplicative Leakage: {}", v.multiplicative_leakage());
    println!("Additive Leakage: {}", v.additive_leakage());
    match v.bayes_security() {
        Some(s) => println!("Bayes security measure: {}", s),
        None => println!("Bayes security measure: undefined (constant secret)"),
    }
    println!("Min-entropy Leakage: {}", v.min_entropy_leakage(params.units));
    Ok(())
}

fn run(args: &Args) -> Result<(), Error> {
    let params = EstimatorParams {
        n_neigh: args.flag_n_neigh,
        units: if args.flag_nats { Units::Nats } else { Units::Bits },
        min_samples: args.flag_min_samples,
        estimator: args.flag_estimator.parse::<Estimator>()?,
        seed: args.flag_seed,
    };
    params.validate()?;

    let (secret, output) = load(&args.arg_samples)?;
    debug!(samples = secret.len(), secret_discrete = secret.discrete,
           output_discrete = output.discrete, "loaded samples");

    if args.cmd_mi {
        run_mi(args, &params, &secret, &output)
    } else {
        run_vulnerability(&params, &secret, &output)
    }
}


fn main() {
    // Parse args from command line.
    let args: Args = Docopt::new(USAGE)
                            .and_then(|d| d.version(Some(env!("CARGO_PKG_VERSION").to_owned()))
                                           .deserialize())
                            .unwrap_or_else(|e| e.exit());

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.flag_verbose { Level::DEBUG } else { Level::WARN })
        .init();

    debug_assert!(args.cmd_mi || args.cmd_vulnerability);
    if let Err(e) = run(&args) {
        eprintln!("[!] {}", e);
        std::process::exit(1);
    }
}
