//! CLI options.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand as ClapSubcommand};

use crate::math::link::LinkFunction;
use crate::model::config::{ModelConfig, Regularization, SimilarityMode};
use crate::trainer::TrainingConfig;

pub mod parsers;

#[derive(Parser)]
#[clap(author, version, about, long_about = None, propagate_version = true)]
pub struct Opts {
    /// Sentry DSN
    #[clap(long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,

    /// Sentry environment
    #[clap(long, env = "SENTRY_ENVIRONMENT")]
    pub sentry_environment: Option<String>,

    /// Performance traces sample rate for Sentry
    #[clap(long, default_value = "0", env = "CHECKIN_MODEL_TRACES_SAMPLE_RATE")]
    pub traces_sample_rate: f32,

    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    Train(TrainOpts),
    Evaluate(EvaluateOpts),
}

/// Fits the model on the training check-ins and saves it
#[derive(Args)]
pub struct TrainOpts {
    #[clap(flatten)]
    pub input: InputOpts,

    #[clap(flatten)]
    pub model: ModelOpts,

    #[clap(flatten)]
    pub optimizer: OptimizerOpts,

    /// Output model record (JSON)
    #[clap(short, long, env = "CHECKIN_MODEL_OUTPUT")]
    pub output: PathBuf,
}

/// Evaluates a saved model against held-out check-ins
#[derive(Args)]
pub struct EvaluateOpts {
    #[clap(flatten)]
    pub input: InputOpts,

    /// Saved model record (JSON)
    #[clap(short, long, env = "CHECKIN_MODEL_RECORD")]
    pub model: PathBuf,

    /// Ground truth check-ins: `<count>,<userId>,<venueId>` lines
    #[clap(short, long, env = "CHECKIN_MODEL_GROUND_TRUTH")]
    pub ground_truth: PathBuf,

    /// Cut-offs of the top-K recall
    #[clap(
        long,
        default_value = "5,10,20",
        value_delimiter = ',',
        value_parser = parsers::non_zero_usize,
        env = "CHECKIN_MODEL_TOP_K",
    )]
    pub top_k: Vec<usize>,
}

#[derive(Args)]
pub struct InputOpts {
    /// Training check-ins: `<userId> <venueId>:<count> …` lines
    #[clap(long, env = "CHECKIN_MODEL_CHECK_INS")]
    pub check_ins: PathBuf,

    /// Venue locations: `<venueId> <lat>,<lng>` lines
    #[clap(long, env = "CHECKIN_MODEL_VENUE_LOCATIONS")]
    pub venue_locations: PathBuf,

    /// Venue neighbors: `<venueId> <neighborId> …` lines
    #[clap(long, env = "CHECKIN_MODEL_NEIGHBORS")]
    pub neighbors: PathBuf,

    /// User locations: `<userId> <lat>,<lng>` lines
    #[clap(long, env = "CHECKIN_MODEL_USER_LOCATIONS")]
    pub user_locations: Option<PathBuf>,

    /// Friendships: `<userId> <friendId> …` lines
    #[clap(long, env = "CHECKIN_MODEL_FRIENDSHIPS")]
    pub friendships: Option<PathBuf>,
}

/// Model hyperparameters.
#[derive(Args, Clone, Copy)]
pub struct ModelOpts {
    /// Number of latent factors
    #[clap(
        short = 'k',
        long = "factors",
        default_value = "10",
        value_parser = parsers::non_zero_usize,
        env = "CHECKIN_MODEL_FACTORS",
    )]
    pub n_factors: usize,

    /// Link function of the neighbor competition
    #[clap(long, value_enum, default_value = "sigmoid", env = "CHECKIN_MODEL_LINK")]
    pub link: LinkFunction,

    /// Venue similarity function
    #[clap(
        long,
        value_enum,
        default_value = "checkin-cosine",
        env = "CHECKIN_MODEL_SIMILARITY"
    )]
    pub similarity: SimilarityMode,

    /// Blend weight between the link function and the similarity
    #[clap(long, default_value = "0.1", value_parser = parsers::unit_interval, env = "CHECKIN_MODEL_ALPHA")]
    pub alpha: f64,

    /// Strength of the neighbor competition
    #[clap(long, default_value = "0.1", value_parser = parsers::unit_interval, env = "CHECKIN_MODEL_BETA")]
    pub beta: f64,

    /// Regularize friends' latent factors towards each other
    #[clap(long, env = "CHECKIN_MODEL_FRIENDSHIP")]
    pub friendship: bool,

    #[clap(flatten)]
    pub regularization: RegularizationOpts,
}

#[derive(Args, Clone, Copy)]
pub struct RegularizationOpts {
    /// Regularization of the user and venue intrinsic latent vectors
    #[clap(long, default_value = "0.01", value_parser = parsers::non_negative_f64)]
    pub lambda_1: f64,

    /// Regularization of the biases
    #[clap(long, default_value = "0.01", value_parser = parsers::non_negative_f64)]
    pub lambda_2: f64,

    /// Regularization of the venue extrinsic latent vectors
    #[clap(long, default_value = "0.01", value_parser = parsers::non_negative_f64)]
    pub lambda_3: f64,

    /// Regularization of the friendship
    #[clap(long, default_value = "0.01", value_parser = parsers::non_negative_f64)]
    pub lambda_f: f64,
}

#[derive(Args, Clone, Copy)]
pub struct OptimizerOpts {
    /// Gradient descent learning rate
    #[clap(
        long = "lr",
        default_value = "0.0001",
        value_parser = parsers::positive_f64,
        env = "CHECKIN_MODEL_LEARNING_RATE"
    )]
    pub learning_rate: f64,

    /// Relative objective change under which the training stops
    #[clap(
        long,
        default_value = "0.0001",
        value_parser = parsers::non_negative_f64,
        env = "CHECKIN_MODEL_THRESHOLD"
    )]
    pub threshold: f64,

    /// Maximum number of iterations
    #[clap(
        long,
        default_value = "20",
        value_parser = parsers::non_zero_usize,
        env = "CHECKIN_MODEL_MAX_ITERATIONS"
    )]
    pub max_iterations: usize,

    /// Seed of the latent factor initialization
    #[clap(long, env = "CHECKIN_MODEL_SEED")]
    pub seed: Option<u64>,
}

impl From<RegularizationOpts> for Regularization {
    fn from(opts: RegularizationOpts) -> Self {
        Self {
            latent: opts.lambda_1,
            bias: opts.lambda_2,
            extrinsic: opts.lambda_3,
            friendship: opts.lambda_f,
        }
    }
}

impl From<ModelOpts> for ModelConfig {
    fn from(opts: ModelOpts) -> Self {
        Self {
            n_factors: opts.n_factors,
            link: opts.link,
            similarity: opts.similarity,
            alpha: opts.alpha,
            beta: opts.beta,
            friendship: opts.friendship,
            regularization: opts.regularization.into(),
        }
    }
}

impl From<OptimizerOpts> for TrainingConfig {
    fn from(opts: OptimizerOpts) -> Self {
        Self {
            learning_rate: opts.learning_rate,
            threshold: opts.threshold,
            max_iterations: opts.max_iterations,
        }
    }
}

pub fn parse() -> Opts {
    Opts::parse()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn parse_train_ok() -> crate::prelude::Result {
        let opts = Opts::try_parse_from([
            "checkin-model",
            "train",
            "--check-ins",
            "cks.txt",
            "--venue-locations",
            "venues.txt",
            "--neighbors",
            "neighbors.txt",
            "-k",
            "5",
            "--link",
            "gaussian-cdf",
            "--similarity",
            "distance-cosine",
            "--alpha",
            "0.25",
            "--lambda-f",
            "0.5",
            "--output",
            "model.json",
        ])?;
        let Subcommand::Train(opts) = opts.subcommand else {
            panic!("expected the train subcommand");
        };
        let config = ModelConfig::from(opts.model);
        assert_eq!(config.n_factors, 5);
        assert_eq!(config.link, LinkFunction::GaussianCdf);
        assert_eq!(config.similarity, SimilarityMode::DistanceCosine);
        assert_eq!(config.alpha, 0.25);
        assert_eq!(config.beta, 0.1);
        assert_eq!(config.regularization.friendship, 0.5);
        assert_eq!(TrainingConfig::from(opts.optimizer).max_iterations, 20);
        Ok(())
    }

    #[test]
    fn parse_alpha_out_of_range_fails() {
        let result = Opts::try_parse_from([
            "checkin-model",
            "train",
            "--check-ins",
            "cks.txt",
            "--venue-locations",
            "venues.txt",
            "--neighbors",
            "neighbors.txt",
            "--alpha",
            "1.5",
            "--output",
            "model.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_evaluate_top_k_ok() -> crate::prelude::Result {
        let opts = Opts::try_parse_from([
            "checkin-model",
            "evaluate",
            "--check-ins",
            "cks.txt",
            "--venue-locations",
            "venues.txt",
            "--neighbors",
            "neighbors.txt",
            "--model",
            "model.json",
            "--ground-truth",
            "test.txt",
            "--top-k",
            "1,3",
        ])?;
        let Subcommand::Evaluate(opts) = opts.subcommand else {
            panic!("expected the evaluate subcommand");
        };
        assert_eq!(opts.top_k, vec![1, 3]);
        Ok(())
    }
}
