use clap::crate_version;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::reader;
use crate::dataset::Dataset;
use crate::model::Model;
use crate::opts::{EvaluateOpts, Subcommand, TrainOpts};
use crate::persistence::ModelRecord;
use crate::prelude::*;
use crate::trainer::Trainer;

mod dataset;
mod evaluation;
mod helpers;
mod math;
mod model;
mod opts;
mod persistence;
mod prelude;
mod trainer;

fn main() -> Result {
    let opts = opts::parse();
    let _sentry_guard = helpers::tracing::init(&opts)?;
    info!(version = crate_version!(), "starting…");

    let result = match opts.subcommand {
        Subcommand::Train(opts) => train(opts),
        Subcommand::Evaluate(opts) => evaluate(opts),
    };
    if let Err(error) = &result {
        helpers::tracing::report_error(error);
    }
    result
}

fn train(opts: TrainOpts) -> Result {
    helpers::tracing::set_app("train");

    let dataset = Dataset::read(&opts.input)?;
    let mut rng = match opts.optimizer.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let model = Model::new(&dataset, opts.model.into(), &mut rng)?;
    let (model, report) = Trainer::new(model, opts.optimizer.into())?.run();
    info!(
        n_iterations = report.n_iterations,
        rmse = report.rmse,
        converged_by = ?report.converged_by,
        "trained",
    );
    ModelRecord::from_model(&model)
        .save(&opts.output)
        .with_context(|| format!("failed to save the model to `{}`", opts.output.display()))
}

fn evaluate(opts: EvaluateOpts) -> Result {
    helpers::tracing::set_app("evaluate");

    let dataset = Dataset::read(&opts.input)?;
    let model = ModelRecord::load(&opts.model)?.into_model(&dataset, &mut StdRng::from_entropy())?;
    let name = opts.ground_truth.display().to_string();
    let ground_truth = reader::read_ground_truth(reader::open(&opts.ground_truth)?, &name)?;

    let evaluation = evaluation::evaluate(&model, &ground_truth, &opts.top_k);
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}
