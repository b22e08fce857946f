use std::{process::ExitCode, time::SystemTime};

use ndarray::Axis;
use orf::{data, EvalPoint, OrderedForest, OrderedForestParamsBuilder};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

fn run(path: &str, n_trees: usize) -> orf::Result<()> {
    let (x, y) = data::load_csv(path)?;
    info!(n_rows = x.nrows(), n_covariates = x.ncols(), "loaded {path}");

    let params = OrderedForestParamsBuilder::new()
        .n_trees(n_trees)
        .honesty(true)
        .replace(false)
        .inference(true)
        .build()?;

    let start = SystemTime::now();
    let forest = OrderedForest::fit(x.view(), y.view(), &params)?;
    if let Ok(elapsed) = start.elapsed() {
        info!(?elapsed, "forest fitted");
    }

    let fitted = forest.fitted();
    if let Some(mean) = fitted.probabilities.mean_axis(Axis(0)) {
        println!("Mean predicted probabilities:");
        for (value, p) in forest.class_values().iter().zip(mean.iter()) {
            println!("  y = {value:<10} {p:.4}");
        }
    }

    let margins = forest.margin(None, EvalPoint::Mean, 0.1)?;
    println!("Marginal effects (window {}):", margins.window);
    for (covariate, effects) in margins.effects.outer_iter().enumerate() {
        print!("  x{covariate:<3}");
        for (class, effect) in effects.iter().enumerate() {
            let p_value = margins
                .p_values
                .as_ref()
                .map_or(f64::NAN, |p| p[[covariate, class]]);
            print!(" {effect:>9.4} (p={p_value:.3})");
        }
        println!();
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: orf <csv> [n_trees]");
        return ExitCode::FAILURE;
    };
    let n_trees = match args.get(2).map(|s| s.parse::<usize>()) {
        None => 1000,
        Some(Ok(n)) => n,
        Some(Err(err)) => {
            eprintln!("invalid number of trees: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(path, n_trees) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
