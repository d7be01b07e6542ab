use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::math::link::LinkFunction;
use crate::prelude::*;

/// Pairwise venue similarity used in the neighbor competition weight.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMode {
    /// Cosine of the per-user check-in count vectors.
    #[default]
    CheckinCosine,

    /// Cosine of the user-to-venue distance vectors over the common users.
    DistanceCosine,

    /// Cosine of the venues' extrinsic latent vectors.
    VectorCosine,

    /// Always `1`.
    Constant,
}

impl SimilarityMode {
    /// Whether the similarity depends on the trainable parameters.
    #[must_use]
    pub const fn is_trainable(self) -> bool {
        matches!(self, Self::VectorCosine)
    }
}

/// Regularization weights.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regularization {
    /// `λ₁`: user latent vectors and venue intrinsic vectors.
    pub latent: f64,

    /// `λ₂`: user and venue biases.
    pub bias: f64,

    /// `λ₃`: venue extrinsic vectors.
    pub extrinsic: f64,

    /// `λ_f`: friendship.
    pub friendship: f64,
}

impl Default for Regularization {
    fn default() -> Self {
        Self {
            latent: 0.01,
            bias: 0.01,
            extrinsic: 0.01,
            friendship: 0.01,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Latent dimension `k`.
    pub n_factors: usize,

    pub link: LinkFunction,
    pub similarity: SimilarityMode,

    /// Blend between the link function and the similarity in the competition weight.
    pub alpha: f64,

    /// Neighbor competition strength.
    pub beta: f64,

    /// Enables the friendship regularization.
    pub friendship: bool,

    pub regularization: Regularization,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_factors: 10,
            link: LinkFunction::default(),
            similarity: SimilarityMode::default(),
            alpha: 0.1,
            beta: 0.1,
            friendship: false,
            regularization: Regularization::default(),
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result {
        ensure!(self.n_factors >= 1, "the number of latent factors must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.alpha),
            "alpha must be within [0, 1], got {}",
            self.alpha,
        );
        ensure!(
            (0.0..=1.0).contains(&self.beta),
            "beta must be within [0, 1], got {}",
            self.beta,
        );
        let regularization = &self.regularization;
        for (name, value) in [
            ("λ₁", regularization.latent),
            ("λ₂", regularization.bias),
            ("λ₃", regularization.extrinsic),
            ("λ_f", regularization.friendship),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                "{} must be a non-negative number, got {}",
                name,
                value,
            );
        }
        Ok(())
    }
}
