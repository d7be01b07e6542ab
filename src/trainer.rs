//! Batch gradient descent over the whole training set.

use serde::Serialize;

use crate::helpers::tracing::format_elapsed;
use crate::model::objective::Objective;
use crate::model::Model;
use crate::prelude::*;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrainingConfig {
    pub learning_rate: f64,

    /// Relative objective change to stop at, `0` disables the check.
    pub threshold: f64,

    pub max_iterations: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.0001,
            threshold: 0.0001,
            max_iterations: 20,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result {
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "the learning rate must be a positive number, got {}",
            self.learning_rate,
        );
        ensure!(
            self.threshold.is_finite() && self.threshold >= 0.0,
            "the threshold must be a non-negative number, got {}",
            self.threshold,
        );
        ensure!(self.max_iterations >= 1, "at least one iteration is required");
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// The relative objective change fell below the threshold.
    Threshold,

    MaxIterations,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Iterating,
    Converged(StopReason),
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub n_iterations: usize,

    /// Objective values, the initial one first.
    pub objectives: Vec<f64>,

    pub rmse: f64,
    pub converged_by: StopReason,
}

pub struct Trainer {
    model: Model,
    config: TrainingConfig,
    phase: Phase,
    n_iterations: usize,
    objectives: Vec<f64>,
    last: Objective,
}

impl Trainer {
    /// Evaluates the initial objective of a freshly built model.
    pub fn new(model: Model, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let mut trainer = Self {
            model,
            config,
            phase: Phase::Initializing,
            n_iterations: 0,
            objectives: Vec::new(),
            last: Objective {
                value: f64::NAN,
                rmse: f64::NAN,
            },
        };
        trainer.initialize();
        Ok(trainer)
    }

    fn initialize(&mut self) {
        debug_assert_eq!(self.phase, Phase::Initializing);
        self.model.refresh_predictions();
        let initial = self.model.objective();
        info!(
            n_check_ins = self.model.store.n_check_ins(),
            mu = self.model.mu,
            objective = initial.value,
            rmse = initial.rmse,
            "initialized",
        );
        self.objectives.push(initial.value);
        self.last = initial;
        self.phase = Phase::Iterating;
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Performs one full-batch iteration, unless already converged.
    #[instrument(level = "debug", skip_all, fields(iteration = self.n_iterations + 1))]
    pub fn step(&mut self) -> Phase {
        if let Phase::Converged(_) = self.phase {
            return self.phase;
        }

        let start_instant = Instant::now();
        let gradients = self.model.gradients();
        self.model.apply(&gradients, self.config.learning_rate);
        self.model.refresh_predictions();
        let objective = self.model.objective();
        self.n_iterations += 1;

        let change = relative_change(self.last.value, objective.value);
        self.log_status(&objective, change, start_instant);
        if !objective.value.is_finite() {
            warn!(
                n_iterations = self.n_iterations,
                "the objective is not finite, consider a lower learning rate",
            );
        }
        self.objectives.push(objective.value);
        self.last = objective;

        self.phase = if change < self.config.threshold {
            Phase::Converged(StopReason::Threshold)
        } else if self.n_iterations >= self.config.max_iterations {
            Phase::Converged(StopReason::MaxIterations)
        } else {
            Phase::Iterating
        };
        self.phase
    }

    /// Iterates until converged.
    pub fn run(mut self) -> (Model, TrainingReport) {
        let start_instant = Instant::now();
        let converged_by = loop {
            if let Phase::Converged(reason) = self.step() {
                break reason;
            }
        };
        info!(
            n_iterations = self.n_iterations,
            ?converged_by,
            elapsed = %format_elapsed(start_instant),
            "converged",
        );
        let report = TrainingReport {
            n_iterations: self.n_iterations,
            objectives: self.objectives,
            rmse: self.last.rmse,
            converged_by,
        };
        (self.model, report)
    }

    fn log_status(&self, objective: &Objective, change: f64, start_instant: Instant) {
        info!(
            "#{:>4} | F: {:>12.4} | RMSE: {:>8.4} | ΔF: {:>9.3e} | {}",
            self.n_iterations,
            objective.value,
            objective.rmse,
            change,
            format_elapsed(start_instant),
        );
    }
}

/// `|current − previous| / |previous|`, with a zero previous value only converging onto zero.
fn relative_change(previous: f64, current: f64) -> f64 {
    if previous == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((current - previous) / previous).abs()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::dataset::Dataset;
    use crate::math::distance::Point;
    use crate::model::config::{ModelConfig, Regularization};
    use crate::model::fixtures;

    #[test]
    fn relative_change_ok() {
        assert_eq!(relative_change(10.0, 9.0), 0.1);
        assert_eq!(relative_change(-10.0, -11.0), 0.1);
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(0.0, 1.0), f64::INFINITY);
        assert!(relative_change(1.0, f64::NAN).is_nan());
    }

    #[test]
    fn invalid_config_fails() {
        let config = TrainingConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = TrainingConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn objective_is_non_increasing() -> Result {
        let model = fixtures::model(ModelConfig {
            n_factors: 3,
            ..Default::default()
        });
        let config = TrainingConfig {
            learning_rate: 1e-4,
            threshold: 0.0,
            max_iterations: 10,
        };
        let (_, report) = Trainer::new(model, config)?.run();
        assert_eq!(report.n_iterations, 10);
        assert_eq!(report.objectives.len(), 11);
        assert_eq!(report.converged_by, StopReason::MaxIterations);
        for (previous, current) in report.objectives.iter().zip(&report.objectives[1..]) {
            assert!(current <= previous, "{} > {}", current, previous);
        }
        Ok(())
    }

    #[test]
    fn single_pair_converges_to_observation() -> Result {
        let dataset = Dataset {
            check_ins: [(
                "alice".to_string(),
                [("cafe".to_string(), 5.0)].into_iter().collect(),
            )]
            .into_iter()
            .collect(),
            venue_locations: [("cafe".to_string(), Point::new(1.3, 103.8))].into_iter().collect(),
            ..Default::default()
        };
        let config = ModelConfig {
            n_factors: 2,
            beta: 0.0,
            regularization: Regularization {
                latent: 0.0,
                bias: 0.0,
                extrinsic: 0.0,
                friendship: 0.0,
            },
            ..Default::default()
        };
        let mut model = Model::new(&dataset, config, &mut StdRng::seed_from_u64(42))?;
        model.mu = 0.0;
        let training = TrainingConfig {
            learning_rate: 0.1,
            threshold: 0.0,
            max_iterations: 200,
        };
        let (model, report) = Trainer::new(model, training)?.run();
        assert!(report.rmse < 1e-6, "RMSE: {}", report.rmse);
        assert!((model.predict("alice", "cafe").unwrap() - 5.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn threshold_stops_early() -> Result {
        let model = fixtures::model(ModelConfig::default());
        let config = TrainingConfig {
            learning_rate: 1e-6,
            threshold: 0.5,
            max_iterations: 100,
        };
        let mut trainer = Trainer::new(model, config)?;
        assert_eq!(trainer.phase(), Phase::Iterating);
        assert_eq!(trainer.step(), Phase::Converged(StopReason::Threshold));
        assert_eq!(trainer.step(), Phase::Converged(StopReason::Threshold));
        let (_, report) = trainer.run();
        assert_eq!(report.n_iterations, 1);
        Ok(())
    }

    #[test]
    fn seeded_runs_are_identical() -> Result {
        let train = || -> Result<Vec<f64>> {
            let config = ModelConfig {
                n_factors: 4,
                ..Default::default()
            };
            let model = Model::new(&fixtures::dataset(), config, &mut StdRng::seed_from_u64(7))?;
            let (_, report) = Trainer::new(model, TrainingConfig::default())?.run();
            Ok(report.objectives)
        };
        assert_eq!(train()?, train()?);
        Ok(())
    }
}
